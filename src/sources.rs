// THEORY:
// Frame sources the tuner can read from. A trial replays every source from its first
// frame, so a source only has to be rewindable, not seekable.
//
// - `ImageSequenceSource` reads a video that has been exported as numbered image files.
//   Files are ordered by their names with digit runs compared as numbers, so
//   `frame_2.png` comes before `frame_10.png` with or without zero padding.
// - `MemorySource` replays frames already held in memory.

use crate::core_modules::frame_pipeline::{Frame, FrameSource};
use crate::error::{Result, TuneError};
use image::ImageFormat;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Replays a fixed list of frames.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    frames: Vec<Frame>,
    cursor: usize,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            name: name.into(),
            frames,
            cursor: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compares two names, treating each run of ASCII digits as one number.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = digit_run(&mut a);
                let right = digit_run(&mut b);
                let left = left.trim_start_matches('0');
                let right = right.trim_start_matches('0');
                let order = left.len().cmp(&right.len()).then_with(|| left.cmp(right));
                if order != Ordering::Equal {
                    return order;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn digit_run(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        run.push(c);
    }
    run
}

/// Decodes the image files of one directory, in file-name order, as video frames.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    name: String,
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    /// Lists every file in `dir` whose extension names a known image format.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(TuneError::EmptyImageSequence(dir.to_path_buf()));
        }
        paths.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)).then_with(|| a.cmp(b)));
        debug!(dir = %dir.display(), frames = paths.len(), "opened image sequence");

        Ok(Self {
            name: dir.display().to_string(),
            paths,
            cursor: 0,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn frame_count(&self) -> u64 {
        self.paths.len() as u64
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let frame = image::open(path)
            .map_err(|e| TuneError::Source {
                source_name: self.name.clone(),
                message: format!("{}: {e}", path.display()),
            })?
            .to_rgba8();
        Ok(Some(frame))
    }
}
