// crates/multiscreen-engine/src/worker.rs
//
// StreamWorker: one per configured source. Owns a media-ingest session
// (open input, pick best video stream, allocate a standalone decoder),
// drives the read -> decode-probe loop, and publishes a StreamStats
// snapshot behind a mutex. Thread-per-resource, cancellation via an
// Arc<AtomicBool>, exactly the shape velocut-media's worker uses for its
// decode threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::media::Type;

use multiscreen_core::stats::StreamStats;

use crate::windowed::{BitrateAccumulator, DecodeFpsSampler, PacketKind};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One ingest/decode-probe worker. `start`/`stop` are idempotent; `stats`
/// returns a consistent snapshot copied under the internal mutex.
pub struct StreamWorker {
    name: String,
    url: String,
    run_flag: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    state: Arc<Mutex<StreamStats>>,
}

impl StreamWorker {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        let url = url.into();
        let state = Arc::new(Mutex::new(StreamStats::new(name.clone(), url.clone())));
        Self {
            name,
            url,
            run_flag: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Idempotent: a second `start()` while already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.run_flag.swap(true, Ordering::SeqCst) {
            return;
        }
        let worker = Arc::clone(self);
        let jh = thread::spawn(move || worker.run_loop());
        *self.handle.lock().unwrap() = Some(jh);
    }

    /// Idempotent: stopping an already-stopped worker is a no-op. Joins the
    /// worker thread before returning.
    pub fn stop(&self) {
        self.run_flag.store(false, Ordering::SeqCst);
        if let Some(jh) = self.handle.lock().unwrap().take() {
            let _ = jh.join();
        }
        let mut st = self.state.lock().unwrap();
        st.running = false;
    }

    pub fn stats(&self) -> StreamStats {
        self.state.lock().unwrap().clone()
    }

    fn set_last_error(&self, msg: &str) {
        let mut st = self.state.lock().unwrap();
        st.last_error = msg.to_string();
    }

    fn run_loop(&self) {
        while self.run_flag.load(Ordering::SeqCst) {
            let mut ictx = match input(&self.url) {
                Ok(ctx) => ctx,
                Err(_) => {
                    self.set_last_error("open failed");
                    sleep_backoff_ms(1000, &self.run_flag);
                    continue;
                }
            };

            let video_idx = ictx.streams().best(Type::Video).map(|s| s.index());
            let mut input_fps = 25.0f64;
            let mut decoder = None;

            if let Some(idx) = video_idx {
                if let Some(stream) = ictx.stream(idx) {
                    input_fps = pick_input_fps(&stream);
                    if let Ok(ctx) =
                        ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                    {
                        decoder = ctx.decoder().video().ok();
                    }
                }
            } else {
                input_fps = 25.0;
            }

            let (sid, pmt_pid, pcr_pid, video_pid, audio_pids, service_name) =
                probe_program_info(&ictx, video_idx);

            {
                let mut st = self.state.lock().unwrap();
                st.running = true;
                st.last_error.clear();
                st.input_fps = input_fps;
                st.decoder = "CPU".to_string();
                st.sid = sid;
                st.pmt_pid = pmt_pid;
                st.pcr_pid = pcr_pid;
                st.video_pid = video_pid;
                st.audio_pids = audio_pids;
                st.service_name = service_name;
            }

            if decoder.is_none() && video_idx.is_none() {
                // no usable video stream: still consume packets for bitrate
                // accounting, but there is nothing to decode-probe.
            }

            let mut fps_sampler = DecodeFpsSampler::new(now_ms());
            fps_sampler.seed(input_fps);
            let mut bitrate_acc = BitrateAccumulator::new(now_ms());

            let mut packets = ictx.packets();
            'read: while self.run_flag.load(Ordering::SeqCst) {
                let (stream, packet) = match packets.next() {
                    Some(Ok(pair)) => pair,
                    _ => break 'read, // EOF or read error: tear down and reconnect
                };

                let is_video = Some(stream.index()) == video_idx;
                let is_audio = !is_video
                    && packet.size() > 0
                    && stream.parameters().medium() == Type::Audio;
                let kind = if is_video {
                    PacketKind::Video
                } else if is_audio {
                    PacketKind::Audio
                } else {
                    PacketKind::Other
                };

                let bits = (packet.size() as u64) * 8;
                let now = now_ms();
                bitrate_acc.add_packet(bits, kind, now);
                {
                    let mut st = self.state.lock().unwrap();
                    st.bitrate_kbps = bitrate_acc.kbps;
                    st.v_kbps = bitrate_acc.v_kbps;
                    st.a_kbps = bitrate_acc.a_kbps;
                    st.rate_mode = bitrate_acc.rate_mode().as_str().to_string();
                }

                if is_video {
                    if let Some(dec) = decoder.as_mut() {
                        if dec.send_packet(&packet).is_ok() {
                            let mut frame = ffmpeg::util::frame::video::Video::empty();
                            while dec.receive_frame(&mut frame).is_ok() {
                                let now = now_ms();
                                fps_sampler.on_frame_decoded(now);
                                let mut st = self.state.lock().unwrap();
                                st.decode_fps = fps_sampler.decode_fps(input_fps);
                            }
                        }
                    }
                }
            }

            drop(packets);
            drop(decoder);
            drop(ictx);

            if self.run_flag.load(Ordering::SeqCst) {
                sleep_backoff_ms(500, &self.run_flag);
            }
        }
    }
}

/// Sleep up to `ms`, waking early (in 20ms slices) if `run_flag` clears —
/// keeps `stop()` latency bounded during reconnect backoff.
fn sleep_backoff_ms(ms: u64, run_flag: &AtomicBool) {
    let slices = (ms / 20).max(1);
    for _ in 0..slices {
        if !run_flag.load(Ordering::SeqCst) {
            return;
        }
        thread::sleep(std::time::Duration::from_millis(20));
    }
}

/// Declared average frame rate, falling back to the real (r_frame_rate)
/// frame rate, falling back to 25.0.
fn pick_input_fps(stream: &ffmpeg::format::stream::Stream) -> f64 {
    let r = stream.rate();
    if let Some(fps) = rational_to_fps(r.numerator(), r.denominator()) {
        return fps;
    }

    // avg_frame_rate is unset on some MPEG-TS inputs; r_frame_rate isn't
    // exposed through a safe wrapper, so read it the same raw-pointer way
    // probe_program_info reads AVProgram fields.
    unsafe {
        let p = stream.as_ptr();
        if !p.is_null() {
            let r = (*p).r_frame_rate;
            if let Some(fps) = rational_to_fps(r.num, r.den) {
                return fps;
            }
        }
    }

    25.0
}

fn rational_to_fps(num: i32, den: i32) -> Option<f64> {
    if num > 0 && den > 0 {
        let fps = num as f64 / den as f64;
        if fps > 1e-6 {
            return Some(fps);
        }
    }
    None
}

/// Raw-pointer program/PID probe: `ffmpeg-the-third` doesn't expose
/// `AVProgram` through a safe wrapper, so this reads the same fields
/// `avformat` itself populates for MPEG-TS inputs.
fn probe_program_info(
    ictx: &ffmpeg::format::context::Input,
    video_idx: Option<usize>,
) -> (i32, i32, i32, i32, Vec<i32>, String) {
    let mut sid = -1i32;
    let mut pmt_pid = -1i32;
    let mut pcr_pid = -1i32;
    let mut video_pid = -1i32;
    let mut audio_pids = Vec::new();
    let mut service_name = String::new();

    unsafe {
        let fmt = ictx.as_ptr();
        if fmt.is_null() || (*fmt).nb_programs == 0 {
            return (sid, pmt_pid, pcr_pid, video_pid, audio_pids, service_name);
        }

        let prog = *(*fmt).programs;
        if prog.is_null() {
            return (sid, pmt_pid, pcr_pid, video_pid, audio_pids, service_name);
        }

        sid = (*prog).id;
        pmt_pid = (*prog).pmt_pid;
        pcr_pid = (*prog).pcr_pid;

        let nb = (*prog).nb_stream_indexes;
        let idxs = std::slice::from_raw_parts((*prog).stream_index, nb as usize);
        for &si in idxs {
            let si = si as usize;
            if si >= (*fmt).nb_streams as usize {
                continue;
            }
            let st_ptr = *(*fmt).streams.add(si);
            if st_ptr.is_null() {
                continue;
            }
            let pid = (*st_ptr).id;
            if video_idx == Some(si) {
                video_pid = pid;
            } else if let Some(stream) = ictx.stream(si) {
                if stream.parameters().medium() == Type::Audio {
                    audio_pids.push(pid);
                }
            }
        }

        if !(*prog).metadata.is_null() {
            let key = std::ffi::CString::new("service_name").unwrap();
            let entry = ffmpeg::ffi::av_dict_get(
                (*prog).metadata,
                key.as_ptr(),
                std::ptr::null(),
                0,
            );
            if !entry.is_null() && !(*entry).value.is_null() {
                service_name = std::ffi::CStr::from_ptr((*entry).value)
                    .to_string_lossy()
                    .into_owned();
            }
        }
    }

    (sid, pmt_pid, pcr_pid, video_pid, audio_pids, service_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_worker_is_not_running_and_reports_unknown_pids() {
        let w = StreamWorker::new("a", "udp://239.0.0.1:1234");
        let st = w.stats();
        assert!(!st.running);
        assert_eq!(st.video_pid, -1);
        assert_eq!(st.sid, -1);
    }

    #[test]
    fn stop_before_start_is_a_harmless_noop() {
        let w = StreamWorker::new("a", "udp://239.0.0.1:1234");
        w.stop();
        assert!(!w.stats().running);
    }

    #[test]
    fn start_then_stop_brings_an_unreachable_source_to_a_clean_halt() {
        // "url://bad" never opens; the worker should set last_error and,
        // once stopped, be join-able within a bounded time with running=false.
        let w = Arc::new(StreamWorker::new("a", "url://bad"));
        w.start();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!w.stats().last_error.is_empty());
        w.stop();
        assert!(!w.stats().running);
    }

    #[test]
    fn double_start_does_not_spawn_a_second_thread() {
        let w = Arc::new(StreamWorker::new("a", "url://bad"));
        w.start();
        w.start(); // no-op: run_flag already true
        w.stop();
        assert!(!w.stats().running);
    }
}
