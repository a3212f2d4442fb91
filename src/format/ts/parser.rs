use super::types::*;
use crate::error::{ReformError, Result};

pub fn parse_header(data: &[u8]) -> Result<TsHeader> {
    if data.len() < TS_HEADER_SIZE {
        return Err(ReformError::InvalidData("TS packet too short".into()));
    }

    if data[0] != SYNC_BYTE {
        return Err(ReformError::InvalidData("Invalid sync byte".into()));
    }

    Ok(TsHeader {
        transport_error: (data[1] & 0x80) != 0,
        payload_unit_start: (data[1] & 0x40) != 0,
        transport_priority: (data[1] & 0x20) != 0,
        pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
        scrambling_control: (data[3] >> 6) & 0x03,
        adaptation_field_exists: (data[3] & 0x20) != 0,
        contains_payload: (data[3] & 0x10) != 0,
        continuity_counter: data[3] & 0x0F,
    })
}

/// Parses the adaptation field starting at `offset` (its length byte).
pub fn parse_adaptation_field(data: &[u8], offset: usize) -> Result<AdaptationField> {
    let length = *data
        .get(offset)
        .ok_or_else(|| ReformError::InvalidData("Adaptation field missing".into()))?
        as usize;
    if length == 0 {
        return Ok(AdaptationField::default());
    }

    if data.len() < offset + length + 1 {
        return Err(ReformError::InvalidData("Adaptation field too short".into()));
    }

    let flags = data[offset + 1];
    let mut field = AdaptationField {
        length,
        discontinuity: (flags & 0x80) != 0,
        random_access: (flags & 0x40) != 0,
        pcr: None,
    };

    if (flags & 0x10) != 0 {
        let pos = offset + 2;
        if length < 7 {
            return Err(ReformError::InvalidData("PCR data too short".into()));
        }
        let pcr_base = ((data[pos] as i64) << 25)
            | ((data[pos + 1] as i64) << 17)
            | ((data[pos + 2] as i64) << 9)
            | ((data[pos + 3] as i64) << 1)
            | ((data[pos + 4] & 0x80) as i64 >> 7);
        let pcr_ext = (((data[pos + 4] & 0x01) as i64) << 8) | (data[pos + 5] as i64);
        field.pcr = Some(pcr_base * 300 + pcr_ext);
    }

    Ok(field)
}

/// Common long-form section header, returning the table id extension, the
/// version and the body between the header and the CRC.
fn section_body(section: &[u8], table_id: u8) -> Result<(u16, u8, &[u8])> {
    if section.len() < 12 {
        return Err(ReformError::InvalidData("PSI section too short".into()));
    }
    if section[0] != table_id {
        return Err(ReformError::InvalidData(format!(
            "unexpected table id 0x{:02x}",
            section[0]
        )));
    }
    let section_length = ((section[1] as usize & 0x0F) << 8) | section[2] as usize;
    let end = 3 + section_length;
    if end > section.len() || section_length < 9 {
        return Err(ReformError::InvalidData("PSI section length out of range".into()));
    }
    let extension = ((section[3] as u16) << 8) | section[4] as u16;
    let version = (section[5] >> 1) & 0x1F;
    Ok((extension, version, &section[8..end - 4]))
}

pub fn parse_pat(section: &[u8]) -> Result<Pat> {
    let (transport_stream_id, _, body) = section_body(section, TABLE_ID_PAT)?;
    let mut pat = Pat {
        transport_stream_id,
        entries: Vec::new(),
    };

    for entry in body.chunks_exact(4) {
        pat.entries.push(PatEntry {
            program_number: ((entry[0] as u16) << 8) | entry[1] as u16,
            program_map_pid: ((entry[2] as u16 & 0x1F) << 8) | entry[3] as u16,
        });
    }

    Ok(pat)
}

pub fn parse_pmt(section: &[u8]) -> Result<Pmt> {
    let (program_number, version, data) = section_body(section, TABLE_ID_PMT)?;
    let mut pmt = Pmt {
        program_number,
        version,
        ..Default::default()
    };
    let end = data.len();
    let mut pos = 0;

    if pos + 4 > end {
        return Err(ReformError::InvalidData("PMT too short for PCR PID".into()));
    }

    pmt.pcr_pid = ((data[pos] as u16 & 0x1F) << 8) | data[pos + 1] as u16;
    pos += 2;

    let program_info_length = ((data[pos] as usize & 0x0F) << 8) | data[pos + 1] as usize;
    pos += 2;

    if program_info_length > 0 {
        if pos + program_info_length > end {
            return Err(ReformError::InvalidData("Program info data too short".into()));
        }
        pmt.program_descriptors = parse_descriptors(&data[pos..pos + program_info_length])?;
        pos += program_info_length;
    }

    while pos + 5 <= end {
        let stream_type = data[pos];
        let elementary_pid = ((data[pos + 1] as u16 & 0x1F) << 8) | data[pos + 2] as u16;
        let es_info_length = ((data[pos + 3] as usize & 0x0F) << 8) | data[pos + 4] as usize;
        pos += 5;

        if pos + es_info_length > end {
            return Err(ReformError::InvalidData("ES info data too short".into()));
        }

        let descriptors = parse_descriptors(&data[pos..pos + es_info_length])?;
        pos += es_info_length;

        pmt.elementary_stream_infos.push(ElementaryStreamInfo {
            stream_type,
            elementary_pid,
            descriptors,
        });
    }

    Ok(pmt)
}

fn parse_descriptors(data: &[u8]) -> Result<Vec<Descriptor>> {
    let mut descriptors = Vec::new();
    let mut pos = 0;

    while pos + 2 <= data.len() {
        let tag = data[pos];
        let length = data[pos + 1] as usize;
        pos += 2;

        if pos + length > data.len() {
            return Err(ReformError::InvalidData("Descriptor data too short".into()));
        }

        descriptors.push(Descriptor {
            tag,
            data: data[pos..pos + length].to_vec(),
        });
        pos += length;
    }

    Ok(descriptors)
}
