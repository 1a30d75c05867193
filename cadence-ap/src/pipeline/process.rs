//! Process-backed stream pipeline (ffmpeg decoder, yt-dlp fetcher)

use super::{PcmStream, ProcessChain, StageSpec, StreamPipeline, StreamRequest, StreamStrategy};
use crate::audio::PcmFormat;
use crate::error::{Error, Result};
use async_trait::async_trait;
use cadence_common::config::AudioConfig;
use cadence_common::DirectStream;
use std::io::Cursor;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Bytes read while waiting for first audio
const PRIME_BUFFER: usize = 16 * 1024;

/// Where the decoder reads its input
enum DecodeInput<'a> {
    Direct(&'a DirectStream),
    Stdin,
}

pub struct ProcessPipeline {
    config: AudioConfig,
    format: PcmFormat,
}

impl ProcessPipeline {
    pub fn new(config: AudioConfig) -> Self {
        let format = PcmFormat::from(&config);
        Self { config, format }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Decoder arguments
    ///
    /// Seek is an input option on the direct path (the origin serves the range)
    /// and an output option when decoding from a pipe (decode and discard).
    fn decode_args(&self, input: DecodeInput<'_>, request: &StreamRequest) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
        let seek = (!request.start.is_zero()).then(|| format_seconds(request.start));

        match input {
            DecodeInput::Direct(direct) => {
                args.push("-nostdin".into());
                if direct.address.starts_with("http") {
                    args.extend(
                        [
                            "-reconnect",
                            "1",
                            "-reconnect_streamed",
                            "1",
                            "-reconnect_delay_max",
                            "5",
                        ]
                        .map(String::from),
                    );
                }
                if !direct.headers.is_empty() {
                    args.push("-headers".into());
                    args.push(direct.header_block());
                }
                if let Some(seek) = &seek {
                    args.push("-ss".into());
                    args.push(seek.clone());
                }
                args.push("-i".into());
                args.push(direct.address.clone());
            }
            DecodeInput::Stdin => {
                args.push("-i".into());
                args.push("pipe:0".into());
                if let Some(seek) = &seek {
                    args.push("-ss".into());
                    args.push(seek.clone());
                }
            }
        }

        args.push("-vn".into());
        if let Some(graph) = request.filters.to_graph(self.format.sample_rate) {
            args.push("-af".into());
            args.push(graph);
        }
        args.extend([
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            self.format.sample_rate.to_string(),
            "-ac".to_string(),
            self.format.channels.to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }

    fn fetch_args(&self, request: &StreamRequest) -> Vec<String> {
        vec![
            "--quiet".into(),
            "--no-warnings".into(),
            "--no-playlist".into(),
            "-f".into(),
            "bestaudio/best".into(),
            "-o".into(),
            "-".into(),
            request.locator.to_string(),
        ]
    }

    async fn open_direct(
        &self,
        request: &StreamRequest,
        direct: &DirectStream,
    ) -> Result<PcmStream> {
        let chain = ProcessChain::spawn(
            format!("direct:{}", request.locator),
            vec![StageSpec::new(
                "decode",
                &self.config.ffmpeg_path,
                self.decode_args(DecodeInput::Direct(direct), request),
            )],
        )?;
        self.prime(chain, StreamStrategy::Direct, request).await
    }

    async fn open_fetch_decode(&self, request: &StreamRequest) -> Result<PcmStream> {
        let chain = ProcessChain::spawn(
            format!("fetch:{}", request.locator),
            vec![
                StageSpec::new("fetch", &self.config.fetcher_path, self.fetch_args(request)),
                StageSpec::new(
                    "decode",
                    &self.config.ffmpeg_path,
                    self.decode_args(DecodeInput::Stdin, request),
                ),
            ],
        )?;
        self.prime(chain, StreamStrategy::FetchDecode, request).await
    }

    /// Wait for the chain's first audio bytes; a chain that stays silent is torn down
    async fn prime(
        &self,
        mut chain: ProcessChain,
        strategy: StreamStrategy,
        request: &StreamRequest,
    ) -> Result<PcmStream> {
        let Some(mut stdout) = chain.take_stdout() else {
            chain.terminate().await;
            return Err(Error::Pipeline("decoder output not captured".to_string()));
        };

        let timeout = self.config.first_audio_timeout();
        let mut first = vec![0u8; PRIME_BUFFER];
        let n = match tokio::time::timeout(timeout, stdout.read(&mut first)).await {
            Ok(Ok(n)) if n > 0 => n,
            Ok(Ok(_)) => {
                chain.terminate().await;
                return Err(Error::Pipeline(format!(
                    "{} produced no audio",
                    chain_label(strategy, request)
                )));
            }
            Ok(Err(e)) => {
                chain.terminate().await;
                return Err(Error::Pipeline(format!(
                    "{} read failed: {}",
                    chain_label(strategy, request),
                    e
                )));
            }
            Err(_) => {
                chain.terminate().await;
                return Err(Error::Pipeline(format!(
                    "{} produced no audio within {:?}",
                    chain_label(strategy, request),
                    timeout
                )));
            }
        };
        first.truncate(n);

        debug!("{}: first audio after priming ({} bytes)", chain.label(), n);
        let reader = Cursor::new(first).chain(stdout);
        Ok(PcmStream::new(
            Box::pin(reader),
            Some(chain),
            strategy,
            request.volume.clone(),
            self.format,
        ))
    }
}

#[async_trait]
impl StreamPipeline for ProcessPipeline {
    async fn open(&self, request: StreamRequest) -> Result<PcmStream> {
        if let Some(direct) = &request.direct {
            match self.open_direct(&request, direct).await {
                Ok(stream) => {
                    info!("Streaming {} via direct address", request.locator);
                    return Ok(stream);
                }
                Err(e) => warn!(
                    "Direct stream failed for {}, falling back to fetch: {}",
                    request.locator, e
                ),
            }
        }

        match self.open_fetch_decode(&request).await {
            Ok(stream) => {
                info!("Streaming {} via fetch-decode", request.locator);
                Ok(stream)
            }
            Err(e) => Err(Error::Resolution(format!(
                "no playable stream for {}: {}",
                request.locator, e
            ))),
        }
    }
}

fn chain_label(strategy: StreamStrategy, request: &StreamRequest) -> String {
    format!("{} stream for {}", strategy, request.locator)
}

/// Seconds with millisecond precision, as ffmpeg's `-ss` takes them
fn format_seconds(offset: Duration) -> String {
    format!("{}.{:03}", offset.as_secs(), offset.subsec_millis())
}
