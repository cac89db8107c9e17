//! Local file frame source using FFmpeg.
//!
//! Decodes the best video stream of a local file to RGB24 in-memory. The file
//! is opened in `connect`, so a missing or unreadable file is an open failure.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::Instant;

use super::file::FileConfig;
use super::SourceStats;
use crate::frame::Frame;

struct Decoding {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    decoding: Option<Decoding>,
    frame_count: u64,
    finished: bool,
    last_error: Option<String>,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Self {
        Self {
            config,
            decoding: None,
            frame_count: 0,
            finished: false,
            last_error: None,
        }
    }

    pub(crate) fn describe(&self) -> String {
        format!("{} (ffmpeg)", self.config.path)
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&self.config.path)
            .with_context(|| format!("failed to open file input '{}' with ffmpeg", self.config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FileSource: connected to {} ({}x{}, ffmpeg)",
            self.config.path,
            decoder.width(),
            decoder.height()
        );
        self.decoding = Some(Decoding {
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
        });
        self.finished = false;
        self.last_error = None;
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let state = self.decoding.as_mut().context("file source not connected")?;

        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        loop {
            if state.decoder.receive_frame(&mut decoded).is_ok() {
                state
                    .scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
                let index = self.frame_count;
                self.frame_count += 1;
                return Frame::new(pixels, width, height, index, Instant::now()).map(Some);
            }

            if state.eof_sent {
                self.finished = true;
                log::info!(
                    "FileSource: {} ended after {} frames",
                    self.config.path,
                    self.frame_count
                );
                return Ok(None);
            }

            let mut sent_packet = false;
            for (stream, packet) in state.input.packets() {
                if stream.index() != state.stream_index {
                    continue;
                }
                if let Err(err) = state.decoder.send_packet(&packet) {
                    self.last_error = Some(err.to_string());
                    return Err(err).context("send packet to ffmpeg decoder");
                }
                sent_packet = true;
                break;
            }

            if !sent_packet {
                state
                    .decoder
                    .send_eof()
                    .context("flush ffmpeg decoder")?;
                state.eof_sent = true;
            }
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.decoding.is_some() && self.last_error.is_none()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.path.clone(),
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than expected")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
