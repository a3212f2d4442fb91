/// Reassembles PSI sections that span transport packets.
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buffer: Vec<u8>,
    started: bool,
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a partly collected section, e.g. after a continuity error.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.started = false;
    }

    /// Adds one packet payload; returns every section it completes.
    pub fn push(&mut self, payload: &[u8], unit_start: bool) -> Vec<Vec<u8>> {
        let mut sections = Vec::new();
        if unit_start {
            let pointer = match payload.first() {
                Some(&p) => p as usize,
                None => return sections,
            };
            let rest = payload.get(1..).unwrap_or_default();
            let split = pointer.min(rest.len());
            if self.started {
                self.buffer.extend_from_slice(&rest[..split]);
                self.extract(&mut sections);
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&rest[split..]);
            self.started = true;
        } else if self.started {
            self.buffer.extend_from_slice(payload);
        }
        self.extract(&mut sections);
        sections
    }

    fn extract(&mut self, sections: &mut Vec<Vec<u8>>) {
        while self.buffer.len() >= 3 {
            if self.buffer[0] == 0xFF {
                // stuffing until the next unit start
                self.reset();
                return;
            }
            let len = 3 + (((self.buffer[1] as usize & 0x0F) << 8) | self.buffer[2] as usize);
            if self.buffer.len() < len {
                return;
            }
            sections.push(self.buffer.drain(..len).collect());
        }
    }
}
