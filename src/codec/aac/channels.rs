use super::types::ElementId;
use crate::av::AudioChannels;

use ElementId::{Cpe, Lfe, Sce};

/// Channel element sequences of the layouts seen in broadcast streams.
const LAYOUT_TABLE: &[(&[ElementId], AudioChannels)] = &[
    (&[Sce], AudioChannels::Mono),
    (&[Cpe], AudioChannels::Stereo),
    (&[Sce, Sce], AudioChannels::DualMono),
    (&[Sce, Cpe], AudioChannels::C30),
    (&[Cpe, Sce], AudioChannels::C21),
    (&[Cpe, Cpe], AudioChannels::C22),
    (&[Sce, Cpe, Sce], AudioChannels::C31),
    (&[Sce, Cpe, Cpe], AudioChannels::C32),
    (&[Sce, Cpe, Cpe, Lfe], AudioChannels::C32Lfe),
    (&[Sce, Cpe, Cpe, Sce, Lfe], AudioChannels::C33Lfe),
    (&[Sce, Cpe, Cpe, Cpe, Lfe], AudioChannels::C52Lfe),
];

/// Matches a channel element sequence against the canonical table.
/// Non-channel elements (fill, data, program config) are ignored.
pub fn layout_from_elements(elements: &[ElementId]) -> Option<AudioChannels> {
    let channel_elements: Vec<ElementId> = elements
        .iter()
        .copied()
        .filter(|e| matches!(e, Sce | Cpe | Lfe))
        .collect();
    LAYOUT_TABLE
        .iter()
        .find(|(seq, _)| *seq == channel_elements.as_slice())
        .map(|(_, layout)| *layout)
}

pub fn layout_from_configuration(channel_configuration: u8) -> Option<AudioChannels> {
    match channel_configuration {
        1 => Some(AudioChannels::Mono),
        2 => Some(AudioChannels::Stereo),
        3 => Some(AudioChannels::C30),
        4 => Some(AudioChannels::C31),
        5 => Some(AudioChannels::C32),
        6 => Some(AudioChannels::C32Lfe),
        7 => Some(AudioChannels::C52Lfe),
        _ => None,
    }
}

/// Last resort when neither the header nor the element list settle it.
pub fn layout_from_count(channels: u32) -> Option<AudioChannels> {
    match channels {
        1 => Some(AudioChannels::Mono),
        2 => Some(AudioChannels::Stereo),
        6 => Some(AudioChannels::C32Lfe),
        8 => Some(AudioChannels::C52Lfe),
        _ => None,
    }
}
