//! Async batch processing module
//!
//! Inspects many note files concurrently. Decoders keep mutable scratch
//! state, so every file gets its own decoder on tokio's blocking pool.

#[cfg(feature = "async")]
/// Concurrent note inspection with a configurable concurrency limit
pub mod processor {
    use crate::parser::{Flipnote, FlipnoteDecoder, NoteSummary};
    use crate::{DecoderSettings, FlipnoteError, Result};
    use futures::stream::{self, StreamExt, TryStreamExt};
    use std::path::{Path, PathBuf};

    /// Concurrent note processor
    #[derive(Debug, Clone)]
    pub struct AsyncBatchProcessor {
        concurrency_limit: usize,
        settings: DecoderSettings,
    }

    impl AsyncBatchProcessor {
        /// Create a new batch processor with one task per CPU
        pub fn new() -> Self {
            Self {
                concurrency_limit: num_cpus::get(),
                settings: DecoderSettings::default(),
            }
        }

        /// Set the concurrency limit
        pub fn with_concurrency(mut self, limit: usize) -> Self {
            self.concurrency_limit = limit.max(1);
            self
        }

        /// Set the decoder settings applied to every file
        pub fn with_settings(mut self, settings: DecoderSettings) -> Self {
            self.settings = settings;
            self
        }

        /// Summarize multiple files concurrently
        ///
        /// Results come back in completion order. The first failure aborts
        /// the batch.
        pub async fn summarize_files<P: AsRef<Path> + Send + Sync>(
            &self,
            files: Vec<P>,
        ) -> Result<Vec<(PathBuf, NoteSummary)>> {
            let results = stream::iter(files.into_iter().map(|path| {
                let processor = self.clone();
                async move { processor.summarize_single_file(path).await }
            }))
            .buffer_unordered(self.concurrency_limit)
            .try_collect()
            .await?;

            Ok(results)
        }

        /// Stream summaries as they complete; failures are yielded per file
        pub fn summarize_files_streaming<P: AsRef<Path> + Send + Sync + 'static>(
            &self,
            files: Vec<P>,
        ) -> impl futures::Stream<Item = Result<(PathBuf, NoteSummary)>> + '_ {
            stream::iter(files.into_iter().map(move |path| {
                let processor = self.clone();
                async move { processor.summarize_single_file(path).await }
            }))
            .buffer_unordered(self.concurrency_limit)
        }

        /// Decode the thumbnail frame of each file as `0xRRGGBBAA` pixels
        pub async fn render_thumbnails<P: AsRef<Path> + Send + Sync>(
            &self,
            files: Vec<P>,
        ) -> Result<Vec<(PathBuf, Vec<u32>)>> {
            let results = stream::iter(files.into_iter().map(|path| {
                let processor = self.clone();
                async move {
                    processor
                        .with_note(path, |note| {
                            let index = note.thumb_frame_index().min(note.frame_count() - 1);
                            note.frame_pixels_rgba(index)
                        })
                        .await
                }
            }))
            .buffer_unordered(self.concurrency_limit)
            .try_collect()
            .await?;

            Ok(results)
        }

        /// Summarize a single file
        async fn summarize_single_file<P: AsRef<Path>>(
            &self,
            path: P,
        ) -> Result<(PathBuf, NoteSummary)> {
            self.with_note(path, |note| NoteSummary::from_decoder(note))
                .await
        }

        /// Read a file, then parse it and run `f` on the blocking pool
        async fn with_note<P, T, F>(&self, path: P, f: F) -> Result<(PathBuf, T)>
        where
            P: AsRef<Path>,
            T: Send + 'static,
            F: FnOnce(&mut Flipnote) -> Result<T> + Send + 'static,
        {
            let path = path.as_ref().to_path_buf();
            let bytes = tokio::fs::read(&path).await?;
            let settings = self.settings.clone();
            log::debug!("batch: decoding {} ({} bytes)", path.display(), bytes.len());

            let output = tokio::task::spawn_blocking(move || {
                let mut note = Flipnote::from_bytes_with_settings(bytes, settings)?;
                f(&mut note)
            })
            .await
            .map_err(|e| FlipnoteError::Io(std::io::Error::other(e)))??;

            Ok((path, output))
        }
    }

    impl Default for AsyncBatchProcessor {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(feature = "async")]
pub use processor::AsyncBatchProcessor;
