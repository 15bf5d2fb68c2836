// chain.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! Destinations for encoded blocks
use crate::block::Trailer;
use crate::error::Result;
use crate::memory::{self, Allocator};
use std::io::Write;
use std::mem;

/// Destination for encoded blocks
///
/// The most recent block stays reachable until another block is pushed,
/// so that its graphic control can still be patched.
pub(crate) trait Output {
    /// Result of a finished animation
    type Finished;

    /// Push a block, committing the previous one
    fn push<A: Allocator>(
        &mut self,
        alloc: &mut A,
        block: Vec<u8>,
    ) -> Result<()>;

    /// Commit all pushed blocks
    fn commit<A: Allocator>(&mut self, alloc: &mut A) -> Result<()>;

    /// Get the most recent uncommitted block
    fn last_mut(&mut self) -> Option<&mut [u8]>;

    /// Append the trailer and finish the animation
    fn finish<A: Allocator>(self, alloc: &mut A) -> Result<Self::Finished>;

    /// Release all blocks without finishing
    fn release<A: Allocator>(&mut self, alloc: &mut A);
}

/// Chain of blocks held in memory
#[derive(Debug, Default)]
pub(crate) struct Memory {
    /// Encoded blocks
    blocks: Vec<Vec<u8>>,
}

/// Blocks written to a sink
pub(crate) struct Sink<W: Write> {
    /// Writer for output data
    writer: W,
    /// Block not yet written
    pending: Option<Vec<u8>>,
}

impl Output for Memory {
    type Finished = Vec<u8>;

    fn push<A: Allocator>(
        &mut self,
        alloc: &mut A,
        block: Vec<u8>,
    ) -> Result<()> {
        if let Err(e) = memory::reserve(alloc, &mut self.blocks) {
            memory::release(alloc, block);
            return Err(e);
        }
        self.blocks.push(block);
        Ok(())
    }

    fn commit<A: Allocator>(&mut self, _alloc: &mut A) -> Result<()> {
        Ok(())
    }

    fn last_mut(&mut self) -> Option<&mut [u8]> {
        self.blocks.last_mut().map(|b| &mut b[..])
    }

    fn finish<A: Allocator>(mut self, alloc: &mut A) -> Result<Vec<u8>> {
        let len = self.blocks.iter().map(|b| b.len()).sum::<usize>();
        let len = len + Trailer::SIZE;
        let mut buf = match memory::with_capacity(alloc, len) {
            Ok(buf) => buf,
            Err(e) => {
                self.release(alloc);
                return Err(e);
            }
        };
        for block in self.blocks.drain(..) {
            buf.extend_from_slice(&block);
            memory::release(alloc, block);
        }
        memory::release(alloc, mem::take(&mut self.blocks));
        Trailer.format(&mut buf);
        Ok(buf)
    }

    fn release<A: Allocator>(&mut self, alloc: &mut A) {
        for block in self.blocks.drain(..) {
            memory::release(alloc, block);
        }
        memory::release(alloc, mem::take(&mut self.blocks));
    }
}

impl<W: Write> Sink<W> {
    /// Create a new sink
    pub fn new(writer: W) -> Self {
        Sink {
            writer,
            pending: None,
        }
    }
}

impl<W: Write> Output for Sink<W> {
    type Finished = W;

    fn push<A: Allocator>(
        &mut self,
        alloc: &mut A,
        block: Vec<u8>,
    ) -> Result<()> {
        let previous = self.pending.replace(block);
        if let Some(previous) = previous {
            let res = self.writer.write_all(&previous);
            memory::release(alloc, previous);
            res?;
        }
        Ok(())
    }

    fn commit<A: Allocator>(&mut self, alloc: &mut A) -> Result<()> {
        if let Some(block) = self.pending.take() {
            let res = self.writer.write_all(&block);
            memory::release(alloc, block);
            res?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn last_mut(&mut self) -> Option<&mut [u8]> {
        self.pending.as_deref_mut()
    }

    fn finish<A: Allocator>(mut self, alloc: &mut A) -> Result<W> {
        self.commit(alloc)?;
        let mut buf = Vec::with_capacity(Trailer::SIZE);
        Trailer.format(&mut buf);
        self.writer.write_all(&buf)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn release<A: Allocator>(&mut self, alloc: &mut A) {
        if let Some(block) = self.pending.take() {
            memory::release(alloc, block);
        }
    }
}
