extern crate ffmpeg_next as ffmpeg;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use color_eyre::eyre::{self, Context};
use ffmpeg::codec::Context as CodecContext;
use ffmpeg::decoder::Video as DecoderVideo;
use ffmpeg::format::context::Input as FormatContext;
use ffmpeg::format::{input_with_dictionary, Pixel};
use ffmpeg::frame::Video as FrameVideo;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::context::Context as ScalingContext;
use ffmpeg::util::log as ffmpeglog;
use ffmpeg::{Dictionary, Packet as CodecPacket, Rational, Rescale};
use ffmpeg_sys_next::{AV_NOPTS_VALUE, AV_TIME_BASE_Q};
use image::RgbImage;

use super::logger::{self, fault, warning, Item, Logger};
use super::timestamp::Timestamp;
use super::{make_thumbnail, FrameShape, FrameSource, Resolution, SourceError};

static FFMPEG_INITIALIZED: OnceLock<std::result::Result<(), ffmpeg::Error>> = OnceLock::new();

thread_local! {
    static LOGS: RefCell<Vec<Item>> = const { RefCell::new(Vec::new()) };
}

/// A `FrameSource` backed by `ffmpeg-next`, generalized from a forward-only decode
/// iterator into indexed random access: every public read seeks to an approximate
/// timestamp for the requested frame index (assuming constant frame rate, as the rest
/// of the engine does) and decodes forward from there until the target is reached.
/// `read_consecutive` reuses that same decode-forward step for every subsequent frame,
/// so it never reseeks between them.
pub struct FfmpegSource {
    path: PathBuf,
    frame_count: u64,
    fps: f64,
    frame_shape: FrameShape,
    inner: Mutex<Inner>,
}

struct Inner {
    logger: logger::LogLogger,
    ictx: FormatContext,
    decoder: DecoderVideo,
    converter: ScalingContext,
    video_stream_index: usize,
    timebase: Rational,
    first_timestamp: i64,
    seek_target_timestamp: i64,
    cur_timestamp: i64,
    orientation: Orientation,
}

impl FfmpegSource {
    pub fn open(path: impl AsRef<Path>) -> eyre::Result<Self> {
        if let Err(e) = FFMPEG_INITIALIZED.get_or_init(|| {
            ffmpeg::init()?;
            ffmpeglog::set_level(ffmpeglog::Level::Warning);
            unsafe {
                ffmpeg_sys_next::av_log_set_callback(Some(ffmpeg_log_adaptor));
            }
            Ok(())
        }) {
            return Err(eyre::eyre!("{e}")).wrap_err("failed to initialize ffmpeg");
        }

        let path = path.as_ref().to_path_buf();
        let options = {
            let mut options = Dictionary::new();
            options.set("analyzeduration", "10M");
            options.set("probesize", "5M");
            options
        };
        let mut ictx =
            input_with_dictionary(&path, options).wrap_err("failed to open the file")?;

        let video = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| eyre::eyre!("no video stream"))?;

        let video_stream_index = video.index();
        eyre::ensure!(video.start_time() != AV_NOPTS_VALUE, "does not have a start time");
        let first_timestamp = video.start_time();
        let timebase = video.time_base();
        let end_timestamp = if video.duration() == AV_NOPTS_VALUE {
            eyre::ensure!(ictx.duration() != AV_NOPTS_VALUE, "does not have a duration");
            ictx.duration().rescale(AV_TIME_BASE_Q, timebase)
        } else {
            video.duration()
        };
        eyre::ensure!(
            end_timestamp >= first_timestamp,
            "the end timestamp is less than the start"
        );

        let frame_rate = video.avg_frame_rate();
        eyre::ensure!(frame_rate.denominator() != 0, "unknown frame rate");
        let fps = frame_rate.numerator() as f64 / frame_rate.denominator() as f64;
        eyre::ensure!(fps > 0.0, "non-positive frame rate");

        let frame_count = {
            let reported = video.frames();
            if reported > 0 {
                reported as u64
            } else {
                let approx_seconds =
                    Timestamp::new(end_timestamp, timebase, first_timestamp).to_duration();
                (approx_seconds.as_secs_f64() * fps).round() as u64
            }
        };

        let orientation = match get_orientation(&video) {
            Some(x) => x,
            None => Orientation::Normal,
        };

        let decoder = CodecContext::from_parameters(video.parameters())
            .wrap_err("no codec found")?
            .decoder()
            .video()
            .wrap_err("no codec found, of type video")?;

        let frame_shape = FrameShape {
            height: decoder.height(),
            width: decoder.width(),
            channels: 3,
        };

        let converter = pixel_converter(&decoder)?;

        ictx.streams_mut()
            .filter(|stream| stream.index() != video_stream_index)
            .for_each(|mut stream| stream_set_discard_all(&mut stream));

        let inner = Inner {
            logger: logger::LogLogger,
            ictx,
            decoder,
            converter,
            video_stream_index,
            timebase,
            first_timestamp,
            seek_target_timestamp: first_timestamp,
            cur_timestamp: first_timestamp,
            orientation,
        };
        inner.log_ffmpeg_logs();

        Ok(Self {
            path,
            frame_count,
            fps,
            frame_shape,
            inner: Mutex::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Inner {
    fn log_ffmpeg_logs(&self) {
        LOGS.with_borrow_mut(|vec| {
            for item in vec.drain(..) {
                self.logger.log_item(item);
            }
        })
    }

    fn target_timestamp(&self, index: u64, fps: f64) -> i64 {
        let dur = Duration::from_secs_f64(index as f64 / fps);
        self.first_timestamp + Timestamp::from_duration(dur).timestamp(self.timebase)
    }

    fn seek_to_target(&mut self, target: i64) -> eyre::Result<()> {
        seek(&mut self.ictx, self.video_stream_index, target, ..)
            .wrap_err("failed to seek")?;
        self.decoder.flush();
        self.seek_target_timestamp = target;
        self.log_ffmpeg_logs();
        Ok(())
    }

    /// Decodes and returns the next frame at or after `seek_target_timestamp`,
    /// discarding any earlier frames along the way.
    fn next_decoded(&mut self) -> eyre::Result<Option<RgbImage>> {
        loop {
            loop {
                let mut frame = FrameVideo::empty();
                match {
                    let ret = self.decoder.receive_frame(&mut frame);
                    self.log_ffmpeg_logs();
                    ret
                } {
                    Ok(()) => (),
                    Err(ffmpeg::Error::Other { errno: libc::EAGAIN }) => break,
                    Err(ffmpeg::Error::Eof) => return Ok(None),
                    Err(e) => {
                        return Err(e).wrap_err("decoder error when receiving a frame");
                    }
                }

                let Some(ts) = frame.timestamp() else {
                    warning!(self.logger, "frame doesn't have a timestamp, skipping");
                    continue;
                };
                self.cur_timestamp = ts;

                if self.cur_timestamp < self.seek_target_timestamp {
                    continue;
                }

                let mut converted = FrameVideo::empty();
                self.converter
                    .run(&frame, &mut converted)
                    .wrap_err("failed to convert the decoded frame")?;
                let img = create_rust_image(converted);
                let img = undo_rotation(img, self.orientation);
                return Ok(Some(img));
            }

            loop {
                let mut packet = CodecPacket::empty();
                match {
                    let ret = packet.read(&mut self.ictx);
                    self.log_ffmpeg_logs();
                    ret
                } {
                    Ok(()) if packet.stream() == self.video_stream_index => {
                        match {
                            let ret = self.decoder.send_packet(&packet);
                            self.log_ffmpeg_logs();
                            ret
                        } {
                            Ok(()) => break,
                            Err(e) => {
                                fault!(self.logger, "failed to decode a frame: {}", e);
                                continue;
                            }
                        }
                    }
                    Ok(()) => continue,
                    Err(ffmpeg::Error::Eof) => {
                        self.decoder.send_eof().wrap_err("failed to send EOF to the decoder")?;
                        break;
                    }
                    Err(e) => {
                        eyre::bail!("failed to read a packet from the stream: {e}");
                    }
                }
            }
        }
    }
}

impl FrameSource for FfmpegSource {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_shape(&self) -> FrameShape {
        self.frame_shape
    }

    fn read_thumbnails(
        &self,
        indexes: &[u64],
        resolution: Resolution,
    ) -> Result<Vec<RgbImage>, SourceError> {
        let mut inner = self.inner.lock().expect("ffmpeg decode mutex poisoned");
        indexes
            .iter()
            .map(|&index| {
                if index >= self.frame_count {
                    return Err(SourceError::IndexOutOfRange {
                        index,
                        frame_count: self.frame_count,
                    });
                }
                let target = inner.target_timestamp(index, self.fps);
                inner.seek_to_target(target).map_err(SourceError::Other)?;
                let frame = inner
                    .next_decoded()
                    .map_err(SourceError::Other)?
                    .ok_or(SourceError::IndexOutOfRange {
                        index,
                        frame_count: self.frame_count,
                    })?;
                Ok(make_thumbnail(&frame, resolution))
            })
            .collect()
    }

    fn read_consecutive(
        &self,
        start: u64,
        count: u64,
        resolution: Resolution,
    ) -> Result<Vec<RgbImage>, SourceError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let last = start + count - 1;
        if last >= self.frame_count {
            return Err(SourceError::IndexOutOfRange {
                index: last,
                frame_count: self.frame_count,
            });
        }

        let mut inner = self.inner.lock().expect("ffmpeg decode mutex poisoned");
        let target = inner.target_timestamp(start, self.fps);
        inner.seek_to_target(target).map_err(SourceError::Other)?;

        (0..count)
            .map(|offset| {
                let frame = inner
                    .next_decoded()
                    .map_err(SourceError::Other)?
                    .ok_or(SourceError::IndexOutOfRange {
                        index: start + offset,
                        frame_count: self.frame_count,
                    })?;
                Ok(make_thumbnail(&frame, resolution))
            })
            .collect()
    }
}

fn pixel_converter(decoder: &DecoderVideo) -> eyre::Result<ScalingContext> {
    eyre::ensure!(decoder.format() != Pixel::None, "no pixel format");
    Ok(ScalingContext::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::Flags::FAST_BILINEAR,
    )?)
}

#[derive(Clone, Copy)]
enum Orientation {
    Normal,
    Left,
    Right,
    Upside,
}

fn get_orientation(video: &ffmpeg::Stream) -> Option<Orientation> {
    for data in video.side_data() {
        if data.kind() != ffmpeg::packet::side_data::Type::DisplayMatrix {
            continue;
        }
        let rot = unsafe {
            ffmpeg_sys_next::av_display_rotation_get(data.data().as_ptr() as *const i32)
        };

        if rot.is_finite() {
            return match rot.round() as i32 {
                -90 => Some(Orientation::Right),
                90 => Some(Orientation::Left),
                0 => Some(Orientation::Normal),
                180 | -180 => Some(Orientation::Upside),
                _ => None,
            };
        }
    }
    Some(Orientation::Normal)
}

fn undo_rotation(img: RgbImage, ori: Orientation) -> RgbImage {
    match ori {
        Orientation::Normal => img,
        Orientation::Right => image::imageops::rotate90(&img),
        Orientation::Left => image::imageops::rotate270(&img),
        Orientation::Upside => image::imageops::rotate180(&img),
    }
}

fn create_rust_image(converted: FrameVideo) -> RgbImage {
    assert_eq!(Pixel::RGB24, converted.format());
    assert_eq!(1, converted.planes());

    let src_linesize = converted.stride(0);
    let width: usize = converted.width().try_into().expect("will always fit");
    let height: usize = converted.height().try_into().expect("will always fit");
    let data = converted.data(0);
    let trg_linesize = 3 * width;

    let data = if src_linesize == trg_linesize {
        data.to_vec()
    } else {
        assert!(src_linesize >= trg_linesize);
        let mut nopadding = vec![0; trg_linesize * height];
        for i in 0..height {
            nopadding[(i * trg_linesize)..((i + 1) * trg_linesize)]
                .copy_from_slice(&data[(i * src_linesize)..(i * src_linesize + trg_linesize)]);
        }
        nopadding
    };

    RgbImage::from_vec(
        width.try_into().expect("was an u32 before"),
        height.try_into().expect("was an u32 before"),
        data,
    )
    .expect("the buffer is big enough")
}

fn stream_set_discard_all(stream: &mut ffmpeg::StreamMut<'_>) {
    unsafe {
        let ptr = stream.as_mut_ptr();
        if !ptr.is_null() {
            (*ptr).discard = ffmpeg_sys_next::AVDiscard::AVDISCARD_ALL;
        }
    }
}

/// A copy of `FormatContext::seek`, except that this accepts a stream index to seek on
/// (the built-in binding always seeks the "default" stream).
fn seek<R: ffmpeg::util::range::Range<i64>>(
    input: &mut FormatContext,
    stream_index: usize,
    ts: i64,
    range: R,
) -> std::result::Result<(), ffmpeg::Error> {
    unsafe {
        match ffmpeg_sys_next::avformat_seek_file(
            input.as_mut_ptr(),
            stream_index.try_into().expect("will probably not be that big"),
            range.start().cloned().unwrap_or(i64::min_value()),
            ts,
            range.end().cloned().unwrap_or(i64::max_value()),
            0,
        ) {
            s if s >= 0 => Ok(()),
            e => Err(ffmpeg::Error::from(e)),
        }
    }
}

extern "C" {
    pub fn vsnprintf(
        strbuf: *mut libc::c_char,
        size: libc::size_t,
        format: *const libc::c_char,
        va_list: *mut libc::c_void,
    ) -> libc::c_int;
}

unsafe extern "C" fn ffmpeg_log_adaptor(
    avcl: *mut libc::c_void,
    level: libc::c_int,
    fmt: *const libc::c_char,
    va_list: *mut ffmpeg_sys_next::__va_list_tag,
) {
    if level > ffmpeg_sys_next::av_log_get_level() {
        return;
    }

    const BUF_SIZE: usize = 2048;
    let mut buffer: Vec<u8> = vec![1; BUF_SIZE];
    let retval = vsnprintf(
        buffer.as_mut_ptr() as *mut libc::c_char,
        BUF_SIZE,
        fmt,
        va_list as *mut libc::c_void,
    );

    match retval {
        ..=-1 => {
            let errno = std::io::Error::last_os_error();
            eprintln!("failed to create log message from ffmpeg, vsnprintf returned: {errno}");
            return;
        }
        written => {
            buffer.pop();
            buffer.truncate(written.try_into().expect("is not negative"))
        }
    }

    let mut rust_str = match String::from_utf8_lossy(&buffer) {
        std::borrow::Cow::Borrowed(_) => String::from_utf8_unchecked(buffer),
        std::borrow::Cow::Owned(s) => s,
    };
    rust_str.truncate(rust_str.trim_end().len());

    let class_name = {
        if avcl.is_null() {
            "NULL_avcl".into()
        } else {
            let avc = *(avcl as *const *const ffmpeg_sys_next::AVClass);
            if avc.is_null() {
                "NULL_avc".into()
            } else if let Some(fun) = (*avc).item_name {
                let item = std::ffi::CStr::from_ptr(fun(avcl)).to_string_lossy();
                if item == "NULL" {
                    std::ffi::CStr::from_ptr((*avc).class_name).to_string_lossy()
                } else {
                    item
                }
            } else {
                "NULL_item".into()
            }
        }
    };

    let target = format!("ffmpeg::{class_name}");
    let level = match ffmpeglog::Level::try_from(level) {
        Ok(ffmpeglog::Level::Verbose) => logger::Level::Verbose,
        Ok(ffmpeglog::Level::Trace) => logger::Level::Verbose,
        Ok(ffmpeglog::Level::Quiet) => logger::Level::Verbose,
        Ok(ffmpeglog::Level::Debug) => logger::Level::Verbose,
        Ok(ffmpeglog::Level::Error) => logger::Level::Error,
        Ok(ffmpeglog::Level::Fatal) => logger::Level::Error,
        Ok(ffmpeglog::Level::Panic) => logger::Level::Error,
        Ok(ffmpeglog::Level::Warning) => logger::Level::Warn,
        Ok(ffmpeglog::Level::Info) => logger::Level::Info,
        Err(_) => logger::Level::Info,
    };

    LOGS.with_borrow_mut(|vec| {
        vec.push(Item {
            level,
            target,
            body: rust_str,
        })
    });
}
