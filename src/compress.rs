//! MCCPv2 outbound compression: a zlib deflate stream layered over the
//! write path. Compressor output lands in a fixed staging buffer and is
//! handed to the caller's sink in chunks; the sink must not feed the
//! bytes back into the compressor.

use std::io;

use flate2::{Compress, Compression, FlushCompress, Status};

pub const COMP_BUFF_LEN: usize = 4096;

/// Flush behavior for one `feed` call, matching zlib's semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    None,
    Sync,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Active,
    Finished,
}

pub struct Compressor {
    z: Compress,
}

impl Compressor {
    pub fn new() -> Self {
        Compressor {
            z: Compress::new(Compression::new(6), true),
        }
    }

    pub fn total_in(&self) -> u64 {
        self.z.total_in()
    }

    pub fn total_out(&self) -> u64 {
        self.z.total_out()
    }

    /// Run `input` through deflate, passing every staged chunk to `sink`.
    /// With `Flush::Finish` the stream is driven to its end marker and
    /// `Outcome::Finished` is returned; the compressor must not be used
    /// again after that.
    pub fn feed<F>(&mut self, mut input: &[u8], flush: Flush, mut sink: F) -> io::Result<Outcome>
    where
        F: FnMut(&[u8]) -> io::Result<()>,
    {
        let mode = match flush {
            Flush::None => FlushCompress::None,
            Flush::Sync => FlushCompress::Sync,
            Flush::Finish => FlushCompress::Finish,
        };
        loop {
            let before_in = self.z.total_in();
            let before_out = self.z.total_out();
            let mut staging = [0u8; COMP_BUFF_LEN];
            let status = self
                .z
                .compress(input, &mut staging, mode)
                .map_err(io::Error::other)?;
            let used = (self.z.total_in() - before_in) as usize;
            let produced = (self.z.total_out() - before_out) as usize;
            input = &input[used..];
            if produced > 0 {
                sink(&staging[..produced])?;
            }
            match status {
                Status::StreamEnd => return Ok(Outcome::Finished),
                // No further progress possible; everything is staged.
                Status::BufError => return Ok(Outcome::Active),
                Status::Ok => {
                    if input.is_empty() && produced < COMP_BUFF_LEN && flush != Flush::Finish {
                        return Ok(Outcome::Active);
                    }
                }
            }
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Compressor::new()
    }
}
