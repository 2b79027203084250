//! Use a prebuilt cpio archive as the rootfs.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use log::info;

use super::{is_gzip, write_output, BuildOptions, Builder};
use crate::cancel::CancelToken;
use crate::error::Result;

pub struct FileBuilder {
    source: PathBuf,
    opts: BuildOptions,
}

impl FileBuilder {
    pub fn new(source: &Path, opts: BuildOptions) -> Self {
        Self {
            source: source.to_path_buf(),
            opts,
        }
    }
}

impl Builder for FileBuilder {
    fn build(&mut self, cancel: &CancelToken) -> Result<PathBuf> {
        cancel.check(&self.opts.architecture)?;

        // Already compressed archives are copied verbatim.
        let compress = self.opts.compress && !is_gzip(&self.source)?;
        info!(
            "Copying {} to {}{}",
            self.source.display(),
            self.opts.output.display(),
            if compress { " (compressed)" } else { "" }
        );

        if fs::canonicalize(&self.source).ok() == fs::canonicalize(&self.opts.output).ok()
            && !compress
        {
            return Ok(self.opts.output.clone());
        }

        write_output(&self.opts.output, compress, |w| {
            let mut reader = BufReader::new(File::open(&self.source)?);
            io::copy(&mut reader, w)?;
            Ok(())
        })?;

        Ok(self.opts.output.clone())
    }

    fn args(&self) -> Vec<String> {
        Vec::new()
    }

    fn env(&self) -> Vec<String> {
        Vec::new()
    }
}
