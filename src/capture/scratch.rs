//! Scratch regions reused by whichever mode is active
//!
//! Allocated once at startup. Only one mode runs at a time, so every mode
//! shares them; the manager zeroes them before each mode starts.

use parking_lot::Mutex;

use super::StreamKind;

/// Default video scratch size
pub const DEFAULT_VIDEO_SCRATCH: usize = 128 * 1024;

/// Default audio scratch size
pub const DEFAULT_AUDIO_SCRATCH: usize = 16 * 1024;

/// Both regions hold at least one byte, so staging always reaches the sink
pub struct ScratchBuffers {
    video: Mutex<Box<[u8]>>,
    audio: Mutex<Box<[u8]>>,
}

impl ScratchBuffers {
    pub fn new(video_len: usize, audio_len: usize) -> Self {
        let region = |len: usize| Mutex::new(vec![0u8; len.max(1)].into_boxed_slice());
        Self {
            video: region(video_len),
            audio: region(audio_len),
        }
    }

    fn region(&self, stream: StreamKind) -> &Mutex<Box<[u8]>> {
        match stream {
            StreamKind::Video => &self.video,
            StreamKind::Audio => &self.audio,
        }
    }

    pub fn capacity(&self, stream: StreamKind) -> usize {
        self.region(stream).lock().len()
    }

    /// Zero-fill both regions
    pub fn zero(&self) {
        self.video.lock().fill(0);
        self.audio.lock().fill(0);
    }

    pub fn is_zeroed(&self) -> bool {
        self.video.lock().iter().all(|&b| b == 0) && self.audio.lock().iter().all(|&b| b == 0)
    }

    /// Copy `packet` through the stream's region, calling `sink` once per
    /// chunk. Chunks are at most the region's capacity.
    ///
    /// Stops at the first error from `sink`.
    pub fn stage<E, F>(&self, stream: StreamKind, packet: &[u8], mut sink: F) -> Result<(), E>
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        let mut region = self.region(stream).lock();
        for chunk in packet.chunks(region.len()) {
            let staged = &mut region[..chunk.len()];
            staged.copy_from_slice(chunk);
            sink(staged)?;
        }
        Ok(())
    }
}

impl Default for ScratchBuffers {
    fn default() -> Self {
        Self::new(DEFAULT_VIDEO_SCRATCH, DEFAULT_AUDIO_SCRATCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffers_are_zeroed() {
        let scratch = ScratchBuffers::new(64, 16);
        assert!(scratch.is_zeroed());
        assert_eq!(scratch.capacity(StreamKind::Video), 64);
        assert_eq!(scratch.capacity(StreamKind::Audio), 16);
    }

    #[test]
    fn test_stage_leaves_data_until_zeroed() {
        let scratch = ScratchBuffers::new(8, 8);
        scratch
            .stage::<(), _>(StreamKind::Audio, &[0xAA; 4], |_| Ok(()))
            .unwrap();
        assert!(!scratch.is_zeroed());

        scratch.zero();
        assert!(scratch.is_zeroed());
    }

    #[test]
    fn test_stage_splits_into_region_sized_chunks() {
        let scratch = ScratchBuffers::new(4, 4);
        let packet: Vec<u8> = (0..10).collect();
        let mut chunks = Vec::new();

        scratch
            .stage::<(), _>(StreamKind::Video, &packet, |chunk| {
                chunks.push(chunk.to_vec());
                Ok(())
            })
            .unwrap();

        assert_eq!(chunks, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
    }

    #[test]
    fn test_zero_length_region_still_forwards() {
        let scratch = ScratchBuffers::new(0, 0);
        assert_eq!(scratch.capacity(StreamKind::Video), 1);

        let mut forwarded = Vec::new();
        scratch
            .stage::<(), _>(StreamKind::Video, b"frame", |chunk| {
                forwarded.extend_from_slice(chunk);
                Ok(())
            })
            .unwrap();

        assert_eq!(forwarded, b"frame");
    }

    #[test]
    fn test_stage_stops_on_error() {
        let scratch = ScratchBuffers::new(2, 2);
        let mut calls = 0;

        let result = scratch.stage(StreamKind::Video, &[1, 2, 3, 4, 5], |_| {
            calls += 1;
            Err("sink closed")
        });

        assert_eq!(result, Err("sink closed"));
        assert_eq!(calls, 1);
    }
}
