use super::types::{AdtsHeader, ElementId, SyntaxElement};
use crate::error::Result;
use crate::utils::BitReader;

/// Result of a reference decode of one ADTS frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFrame {
    pub samples_per_channel: u32,
    pub channels: u32,
    /// Channel element sequence, used to resolve layouts the header does not declare.
    pub elements: Vec<ElementId>,
    /// Bit spans of the elements, when the decoder tracks them.
    pub spans: Vec<SyntaxElement>,
    pub consumed: usize,
    pub error: bool,
}

impl DecodedFrame {
    pub fn failed() -> Self {
        Self {
            error: true,
            ..Default::default()
        }
    }
}

/// A decoder able to fully decode AAC frames.
///
/// The ADTS parser resets it and retries once whenever a decode fails or
/// reports a channel count other than the one expected.
pub trait AacDecoder: Send {
    fn decode(&mut self, frame: &[u8]) -> DecodedFrame;
    fn reset(&mut self);
}

/// Builds one decoder per audio stream.
pub type DecoderFactory = Box<dyn Fn() -> Box<dyn AacDecoder> + Send>;

/// Decoder that answers from the ADTS header alone.
///
/// Sample counts come from `number_of_raw_data_blocks`. For
/// `channel_configuration == 0` it resolves the layout from a program config
/// element at the start of the raw data; without one the frame is reported
/// as failed.
#[derive(Debug, Default, Clone)]
pub struct HeaderDecoder;

impl AacDecoder for HeaderDecoder {
    fn decode(&mut self, frame: &[u8]) -> DecodedFrame {
        let header = match AdtsHeader::parse(frame) {
            Ok(h) => h,
            Err(_) => return DecodedFrame::failed(),
        };
        let consumed = (header.frame_length as usize).min(frame.len());

        if let Some(channels) = header.configured_channels() {
            return DecodedFrame {
                samples_per_channel: header.samples(),
                channels,
                consumed,
                ..Default::default()
            };
        }

        let raw = &frame[header.header_len().min(frame.len())..consumed];
        match parse_leading_pce(raw) {
            Ok(Some(elements)) => {
                let channels = elements
                    .iter()
                    .map(|e| match e {
                        ElementId::Cpe => 2,
                        ElementId::Sce | ElementId::Lfe => 1,
                        _ => 0,
                    })
                    .sum();
                DecodedFrame {
                    samples_per_channel: header.samples(),
                    channels,
                    elements,
                    consumed,
                    ..Default::default()
                }
            }
            _ => DecodedFrame::failed(),
        }
    }

    fn reset(&mut self) {}
}

/// Reads a program_config_element if the raw data starts with one and returns
/// its channel element sequence (front, side, back, LFE).
pub fn parse_leading_pce(raw: &[u8]) -> Result<Option<Vec<ElementId>>> {
    let mut r = BitReader::new(raw);
    if ElementId::from(r.read_bits(3)? as u8) != ElementId::Pce {
        return Ok(None);
    }

    // element_instance_tag, object_type, sampling_frequency_index
    r.skip_bits(4 + 2 + 4)?;
    let num_front = r.read_bits(4)?;
    let num_side = r.read_bits(4)?;
    let num_back = r.read_bits(4)?;
    let num_lfe = r.read_bits(2)?;
    let _num_assoc_data = r.read_bits(3)?;
    let _num_valid_cc = r.read_bits(4)?;
    if r.read_bit()? {
        r.skip_bits(4)?;
    }
    if r.read_bit()? {
        r.skip_bits(4)?;
    }
    if r.read_bit()? {
        r.skip_bits(3)?;
    }

    let mut elements = Vec::new();
    for _ in 0..num_front + num_side + num_back {
        let is_cpe = r.read_bit()?;
        r.skip_bits(4)?;
        elements.push(if is_cpe { ElementId::Cpe } else { ElementId::Sce });
    }
    for _ in 0..num_lfe {
        r.skip_bits(4)?;
        elements.push(ElementId::Lfe);
    }
    Ok(Some(elements))
}

#[cfg(test)]
mod tests {
    use super::super::types::test_util;
    use super::*;
    use crate::utils::BitWriter;
    use pretty_assertions::assert_eq;

    fn pce_frame() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(ElementId::Pce as u32, 3);
        w.write_bits(0, 4 + 2 + 4);
        w.write_bits(2, 4); // front
        w.write_bits(0, 4); // side
        w.write_bits(1, 4); // back
        w.write_bits(1, 2); // lfe
        w.write_bits(0, 3 + 4);
        w.write_bits(0, 3); // no mixdowns
        w.write_bit(false); // front SCE
        w.write_bits(0, 4);
        w.write_bit(true); // front CPE
        w.write_bits(0, 4);
        w.write_bit(true); // back CPE
        w.write_bits(1, 4);
        w.write_bits(0, 4); // lfe tag
        w.byte_align(false);
        let raw = w.finish().unwrap();

        let mut frame = test_util::header(0, (7 + raw.len()) as u16).to_bytes();
        frame.extend_from_slice(&raw);
        frame
    }

    #[test]
    fn test_configured_channels() {
        let frame = test_util::frame(2, 64);
        let out = HeaderDecoder.decode(&frame);
        assert!(!out.error);
        assert_eq!(out.channels, 2);
        assert_eq!(out.samples_per_channel, 1024);
        assert_eq!(out.consumed, 64);
    }

    #[test]
    fn test_pce_layout() {
        let out = HeaderDecoder.decode(&pce_frame());
        assert!(!out.error);
        assert_eq!(
            out.elements,
            vec![ElementId::Sce, ElementId::Cpe, ElementId::Cpe, ElementId::Lfe]
        );
        assert_eq!(out.channels, 6);
    }

    #[test]
    fn test_config_zero_without_pce_fails() {
        let frame = test_util::frame(0, 64);
        assert!(HeaderDecoder.decode(&frame).error);
    }
}
