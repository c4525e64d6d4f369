//! Staging of generated audio between the generator and the sink.

use crate::rt_processing::waveform::ToneGenerator;
use cadence_core::{AudioFormat, Error, Result};
use std::collections::VecDeque;
use std::ops::Deref;

/// Owned, frame-aligned block of device-format sample bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleChunk {
    bytes: Vec<u8>,
    frames: u32,
}

impl SampleChunk {
    /// A zero-filled chunk of `frames` frames. Zero bytes are silence for every
    /// supported encoding.
    pub fn silent(frames: u32, format: &AudioFormat) -> Result<Self> {
        let len = format.frames_to_bytes(frames);
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len).map_err(|_| Error::Allocation {
            what: "sample chunk",
            bytes: len,
        })?;
        bytes.resize(len, 0);
        Ok(Self { bytes, frames })
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// The next chunk to hand to the sink.
///
/// Bulk pools give up ownership of the chunk; streaming pools lend their
/// single reusable chunk until the next call.
pub enum PendingChunk<'a> {
    Owned(SampleChunk),
    Borrowed(&'a SampleChunk),
}

impl PendingChunk<'_> {
    pub fn frames(&self) -> u32 {
        match self {
            Self::Owned(chunk) => chunk.frames(),
            Self::Borrowed(chunk) => chunk.frames(),
        }
    }
}

impl Deref for PendingChunk<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(chunk) => chunk.as_bytes(),
            Self::Borrowed(chunk) => chunk.as_bytes(),
        }
    }
}

pub enum SampleBufferPool {
    Bulk {
        queue: VecDeque<SampleChunk>,
        chunk_frames: u32,
        frame_size: usize,
    },
    Streaming {
        chunk: SampleChunk,
        generator: ToneGenerator,
    },
}

impl SampleBufferPool {
    /// Pre-render `ceil(total_frames / chunk_frames)` full-size chunks.
    ///
    /// The tail of the last chunk runs past the session length; the scheduler
    /// stops by frame count, so nothing beyond the final chunk is ever sent.
    pub fn bulk(mut generator: ToneGenerator, chunk_frames: u32, total_frames: u64) -> Result<Self> {
        if chunk_frames == 0 {
            return Err(Error::InvalidConfig("chunk size must be at least one frame".into()));
        }
        let format = *generator.format();
        let count = total_frames.div_ceil(u64::from(chunk_frames)) as usize;

        let mut queue = VecDeque::new();
        queue.try_reserve_exact(count).map_err(|_| Error::Allocation {
            what: "chunk queue",
            bytes: count * std::mem::size_of::<SampleChunk>(),
        })?;

        for _ in 0..count {
            let mut chunk = SampleChunk::silent(chunk_frames, &format)?;
            generator.fill(chunk.as_bytes_mut());
            queue.push_back(chunk);
        }

        tracing::debug!(
            chunks = count,
            chunk_frames,
            bytes = count * format.frames_to_bytes(chunk_frames),
            "pre-rendered session audio"
        );

        Ok(Self::Bulk {
            queue,
            chunk_frames,
            frame_size: format.frame_size(),
        })
    }

    pub fn streaming(generator: ToneGenerator, chunk_frames: u32) -> Result<Self> {
        if chunk_frames == 0 {
            return Err(Error::InvalidConfig("chunk size must be at least one frame".into()));
        }
        let chunk = SampleChunk::silent(chunk_frames, generator.format())?;
        Ok(Self::Streaming { chunk, generator })
    }

    pub fn chunk_frames(&self) -> u32 {
        match self {
            Self::Bulk { chunk_frames, .. } => *chunk_frames,
            Self::Streaming { chunk, .. } => chunk.frames(),
        }
    }

    pub fn chunk_bytes(&self) -> usize {
        match self {
            Self::Bulk {
                chunk_frames,
                frame_size,
                ..
            } => *chunk_frames as usize * frame_size,
            Self::Streaming { chunk, .. } => chunk.len(),
        }
    }

    /// Chunks still queued; `None` for a streaming pool, which never runs out.
    pub fn remaining_chunks(&self) -> Option<usize> {
        match self {
            Self::Bulk { queue, .. } => Some(queue.len()),
            Self::Streaming { .. } => None,
        }
    }

    /// Next chunk in generation order.
    pub fn next_chunk(&mut self) -> Option<PendingChunk<'_>> {
        match self {
            Self::Bulk { queue, .. } => queue.pop_front().map(PendingChunk::Owned),
            Self::Streaming { chunk, generator } => {
                generator.fill(chunk.as_bytes_mut());
                Some(PendingChunk::Borrowed(chunk))
            }
        }
    }
}
