//! Channel layout adaptation between input and output streams.
//!
//! Only one conversion exists: a mono input feeding a stereo output has every
//! sample duplicated into both channels. Every other pairing passes buffers
//! through untouched; the devices' native layouts must already agree.
//!
//! The functions are generic over the sample unit, so a buffer of `f32`
//! samples and a raw byte buffer grouped into fixed-width sample units
//! (`[u8; 4]` for 32-bit float) are converted the same way.

use std::borrow::Cow;

/// Conversion applied to every chunk of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAdapter {
    /// Buffers pass through unchanged.
    Identity,
    /// Each sample `k` is written to output positions `2k` and `2k + 1`.
    MonoToStereo,
}

impl ChannelAdapter {
    /// Pick the adapter for a pair of native channel counts.
    pub fn select(input_channels: u16, output_channels: u16) -> Self {
        match (input_channels, output_channels) {
            (1, 2) => ChannelAdapter::MonoToStereo,
            _ => ChannelAdapter::Identity,
        }
    }

    /// Length of the adapted buffer for an input of `len` samples.
    pub fn output_len(self, len: usize) -> usize {
        match self {
            ChannelAdapter::Identity => len,
            ChannelAdapter::MonoToStereo => len * 2,
        }
    }

    /// Convert one buffer, borrowing it when no conversion is needed.
    pub fn apply<'a, T: Copy>(self, buffer: &'a [T]) -> Cow<'a, [T]> {
        match self {
            ChannelAdapter::Identity => Cow::Borrowed(buffer),
            ChannelAdapter::MonoToStereo => {
                let mut out = Vec::with_capacity(buffer.len() * 2);
                for &sample in buffer {
                    out.push(sample);
                    out.push(sample);
                }
                Cow::Owned(out)
            }
        }
    }
}

impl std::fmt::Display for ChannelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelAdapter::Identity => f.write_str("identity"),
            ChannelAdapter::MonoToStereo => f.write_str("mono→stereo"),
        }
    }
}

/// Convert `buffer` from `input_channels` to `output_channels`.
///
/// Shorthand for `ChannelAdapter::select(..).apply(buffer)`.
pub fn adapt<T: Copy>(buffer: &[T], input_channels: u16, output_channels: u16) -> Cow<'_, [T]> {
    ChannelAdapter::select(input_channels, output_channels).apply(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_mono_to_stereo_only_for_one_to_two() {
        assert_eq!(ChannelAdapter::select(1, 2), ChannelAdapter::MonoToStereo);
        assert_eq!(ChannelAdapter::select(2, 2), ChannelAdapter::Identity);
        assert_eq!(ChannelAdapter::select(2, 1), ChannelAdapter::Identity);
        assert_eq!(ChannelAdapter::select(1, 6), ChannelAdapter::Identity);
        assert_eq!(ChannelAdapter::select(0, 2), ChannelAdapter::Identity);
    }

    #[test]
    fn mono_to_stereo_duplicates_samples() {
        let out = adapt(&[0.1f32, -0.2, 0.3], 1, 2);
        assert_eq!(&*out, &[0.1, 0.1, -0.2, -0.2, 0.3, 0.3]);
    }

    #[test]
    fn identity_borrows() {
        let input = [1.0f32, 2.0, 3.0, 4.0];
        let out = adapt(&input, 2, 2);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, &input);
    }

    #[test]
    fn byte_units_keep_their_width() {
        let a = 0.5f32.to_le_bytes();
        let b = (-1.0f32).to_le_bytes();
        let input = [a, b];
        let out = adapt(&input, 1, 2);
        let bytes: Vec<u8> = out.iter().flatten().copied().collect();

        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &a);
        assert_eq!(&bytes[4..8], &a);
        assert_eq!(&bytes[8..12], &b);
        assert_eq!(&bytes[12..16], &b);
    }

    #[test]
    fn empty_buffer() {
        let out = adapt::<f32>(&[], 1, 2);
        assert!(out.is_empty());
    }

    #[test]
    fn output_len() {
        assert_eq!(ChannelAdapter::MonoToStereo.output_len(1024), 2048);
        assert_eq!(ChannelAdapter::Identity.output_len(1024), 1024);
    }
}
