//! Frames read from a directory of still images.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::image::{self, Image};

use super::FrameSource;

/// Plays back the JPEG and PNG files of a directory, ordered by file name.
///
/// Once every file has been returned, [`FrameSource::next_frame`] fails (unless the sequence is
/// set to loop).
pub struct ImageSequence {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl ImageSequence {
    /// Collects the supported image files in `dir`.
    ///
    /// Subdirectories and files with other extensions are ignored. Fails if `dir` cannot be read
    /// or contains no images.
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read directory '{}'", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && image::is_supported_path(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            bail!("no JPEG or PNG images found in '{}'", dir.display());
        }
        paths.sort();

        log::info!("playing {} images from '{}'", paths.len(), dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            paths,
            next: 0,
            looping: false,
        })
    }

    /// Restarts from the first image instead of failing at the end.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Number of images in the sequence.
    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Images that have not been returned yet.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.paths.len() - self.next
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> anyhow::Result<Image> {
        if self.next == self.paths.len() {
            if !self.looping {
                bail!("image sequence '{}' is exhausted", self.dir.display());
            }
            self.next = 0;
        }

        let path = &self.paths[self.next];
        self.next += 1;
        log::trace!("reading frame '{}'", path.display());
        Image::load(path)
    }

    fn describe(&self) -> String {
        format!("image sequence '{}'", self.dir.display())
    }
}
