use super::decoder::AacDecoder;
use super::types::{AdtsHeader, ElementId, SyntaxElement, ADTS_HEADER_SIZE};
use crate::error::{ReformError, Result};
use crate::utils::{BitReader, BitWriter};

/// Rewrites one dual-mono ADTS frame as two mono frames.
///
/// Each single channel element is bit-copied, id included, behind a fresh
/// header with `channel_configuration = 1`, then terminated with an END
/// element and zero padding. No audio is re-encoded.
pub fn split_dual_mono(frame: &[u8], spans: &[SyntaxElement]) -> Result<[Vec<u8>; 2]> {
    let header = AdtsHeader::parse(frame)?;
    let frame_len = (header.frame_length as usize).min(frame.len());
    let raw = frame
        .get(header.header_len()..frame_len)
        .ok_or_else(|| ReformError::Codec("ADTS frame shorter than its header".into()))?;

    let sce: Vec<&SyntaxElement> = spans.iter().filter(|s| s.id == ElementId::Sce).collect();
    if sce.len() != 2 {
        return Err(ReformError::Codec(format!(
            "dual mono frame carries {} single channel elements",
            sce.len()
        )));
    }

    let mut out: [Vec<u8>; 2] = Default::default();
    for (slot, span) in out.iter_mut().zip(sce) {
        if span.end_bit <= span.start_bit || span.end_bit > raw.len() * 8 {
            return Err(ReformError::Codec(format!(
                "element span {}..{} outside {} raw bits",
                span.start_bit,
                span.end_bit,
                raw.len() * 8
            )));
        }
        let bits = span.end_bit - span.start_bit;
        let length = (bits + 3 + 7) / 8 + ADTS_HEADER_SIZE;

        let mono = AdtsHeader {
            protection_absent: true,
            channel_configuration: 1,
            frame_length: length as u16,
            number_of_raw_blocks: 0,
            ..header.clone()
        };
        let mut writer = BitWriter::with_capacity(length);
        mono.write(&mut writer);

        let mut reader = BitReader::new(raw);
        reader.skip_bits(span.start_bit)?;
        writer.copy_bits(&mut reader, bits)?;
        writer.write_bits(ElementId::End as u32, 3);
        writer.byte_align(false);
        *slot = writer.finish()?;
    }
    Ok(out)
}

/// Splits a dual-mono stream frame by frame, asking the decoder for the
/// element spans.
pub struct DualMonoSplitter {
    decoder: Box<dyn AacDecoder>,
}

impl DualMonoSplitter {
    pub fn new(decoder: Box<dyn AacDecoder>) -> Self {
        Self { decoder }
    }

    pub fn split(&mut self, frame: &[u8]) -> Result<[Vec<u8>; 2]> {
        let mut decoded = self.decoder.decode(frame);
        if decoded.error {
            self.decoder.reset();
            decoded = self.decoder.decode(frame);
            if decoded.error {
                return Err(ReformError::Codec("dual mono frame failed to decode".into()));
            }
        }
        split_dual_mono(frame, &decoded.spans)
    }
}
