use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use spark_obb::pipeline::NoProgress;
use spark_obb::{
    process, DetectError, Detection, Detector, FfmpegSource, Frame, FrameDetections, Obb,
    PipelineError, ProgressObserver, SinkError, SourceError, Tally, Thresholds, VideoInfo,
    VideoSink, VideoSource,
};

// ========== 测试替身 ==========

struct VecSource {
    info: VideoInfo,
    frames: VecDeque<Frame>,
    /// 读出这么多帧之后返回解码错误
    fail_after: Option<u64>,
    read: u64,
}

impl VecSource {
    fn new(n: u64, declared: u64) -> Self {
        let frames = (0..n)
            .map(|i| Frame::filled(i, 8, 6, [(i % 256) as u8, 0, 0]))
            .collect();
        Self {
            info: VideoInfo::new(8, 6, 25.0, declared),
            frames,
            fail_after: None,
            read: 0,
        }
    }

    fn failing_after(mut self, k: u64) -> Self {
        self.fail_after = Some(k);
        self
    }
}

impl VideoSource for VecSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.fail_after == Some(self.read) {
            return Err(SourceError::Decode {
                frame: self.read,
                reason: "corrupt packet".to_string(),
            });
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.read += 1;
        }
        Ok(frame)
    }
}

#[derive(Default)]
struct SinkLog {
    indices: Vec<u64>,
    published: bool,
}

struct MemorySink {
    log: Arc<Mutex<SinkLog>>,
    written: u64,
    fail_at: Option<u64>,
}

impl MemorySink {
    fn new() -> (Self, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                written: 0,
                fail_at: None,
            },
            log,
        )
    }
}

impl VideoSink for MemorySink {
    fn write(&mut self, frame: Frame) -> Result<(), SinkError> {
        if self.fail_at == Some(frame.index) {
            return Err(SinkError::Write {
                frame: frame.index,
                reason: "disk full".to_string(),
            });
        }
        self.log.lock().unwrap().indices.push(frame.index);
        self.written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }

    fn finish(self) -> Result<PathBuf, SinkError> {
        if self.written == 0 {
            return Err(SinkError::Empty);
        }
        self.log.lock().unwrap().published = true;
        Ok(PathBuf::from("output_sparks.mp4"))
    }
}

/// 每帧返回固定的检测结果
struct StubDetector {
    per_frame: Vec<Detection>,
    fail_at: Option<u64>,
}

impl StubDetector {
    fn new(per_frame: Vec<Detection>) -> Self {
        Self {
            per_frame,
            fail_at: None,
        }
    }
}

impl Detector for StubDetector {
    fn detect(&mut self, frame: &Frame, _thresholds: &Thresholds) -> Result<FrameDetections, DetectError> {
        if self.fail_at == Some(frame.index) {
            return Err(DetectError::Inference(anyhow::anyhow!("session crashed")));
        }
        Ok(FrameDetections {
            detections: self.per_frame.clone(),
            annotated: frame.clone(),
        })
    }
}

/// 检测数由帧内容和阈值决定
struct ContentDetector;

impl Detector for ContentDetector {
    fn detect(&mut self, frame: &Frame, thresholds: &Thresholds) -> Result<FrameDetections, DetectError> {
        let score = frame.data[0] as f32 / 10.0;
        let detections = (0..frame.data[0] % 3)
            .map(|i| spark(score.min(1.0) - i as f32 * 0.1))
            .filter(|d| d.confidence >= thresholds.conf)
            .collect();
        Ok(FrameDetections {
            detections,
            annotated: frame.clone(),
        })
    }
}

#[derive(Default)]
struct RecordingObserver {
    values: Vec<f32>,
}

impl ProgressObserver for RecordingObserver {
    fn on_progress(&mut self, fraction: f32, _frames_done: u64) {
        self.values.push(fraction);
    }
}

fn spark(confidence: f32) -> Detection {
    Detection::new(0, "spark", confidence, Obb::new(4.0, 3.0, 4.0, 2.0, 0.0))
}

fn named(name: &str) -> Detection {
    Detection::new(1, name, 0.9, Obb::new(4.0, 3.0, 4.0, 2.0, 0.0))
}

// ========== 测试 ==========

#[test]
fn frames_written_equal_frames_read_in_order() {
    let mut source = VecSource::new(12, 12);
    let (sink, log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![]);

    let summary = process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut NoProgress,
    )
    .unwrap();

    let log = log.lock().unwrap();
    assert!(log.published);
    assert_eq!(log.indices, (0..12).collect::<Vec<u64>>());
    assert_eq!(summary.frames_processed, 12);
    assert_eq!(summary.frames_written, 12);
    assert!(summary.completed);
}

#[test]
fn one_spark_per_frame_counts_n() {
    let mut source = VecSource::new(30, 30);
    let (sink, _log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![spark(0.9)]);

    let summary = process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut NoProgress,
    )
    .unwrap();
    assert_eq!(summary.spark_count, 30);
    assert_eq!(summary.class_totals.get("spark"), Some(&30));
}

#[test]
fn zero_detections_count_zero_and_write_all_frames() {
    let mut source = VecSource::new(17, 17);
    let (sink, log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![]);

    let summary = process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut NoProgress,
    )
    .unwrap();
    assert_eq!(summary.spark_count, 0);
    assert_eq!(log.lock().unwrap().indices.len(), 17);
}

#[test]
fn only_matching_class_names_are_counted() {
    let mut source = VecSource::new(4, 4);
    let (sink, _log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![named("Spark-Large"), named("smoke"), named("big_SPARK")]);

    let summary = process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut NoProgress,
    )
    .unwrap();
    assert_eq!(summary.spark_count, 8);
    assert_eq!(summary.class_totals.get("smoke"), Some(&4));
}

#[test]
fn spark_count_never_decreases() {
    let mut tally = Tally::new("spark");
    let frames = [vec![spark(0.9)], vec![], vec![named("smoke")], vec![spark(0.5), spark(0.4)]];
    let mut last = 0;
    for dets in frames.iter() {
        let count = tally.observe(dets);
        assert!(count >= last);
        last = count;
    }
    assert_eq!(last, 3);
}

#[test]
fn progress_follows_frames_and_ends_at_one() {
    let n = 8;
    let mut source = VecSource::new(n, n);
    let (sink, _log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![]);
    let mut observer = RecordingObserver::default();

    process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut observer,
    )
    .unwrap();

    for k in 1..=n {
        let expected = (k as f64 / n as f64).min(1.0) as f32;
        assert_eq!(observer.values[(k - 1) as usize], expected);
    }
    assert_eq!(*observer.values.last().unwrap(), 1.0);
    assert!(observer.values.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn progress_is_clamped_when_frame_count_undercounts() {
    let mut source = VecSource::new(6, 4);
    let (sink, _log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![]);
    let mut observer = RecordingObserver::default();

    let summary = process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut observer,
    )
    .unwrap();
    assert_eq!(summary.frames_processed, 6);
    assert!(observer.values.iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(observer.values[3], 1.0);
    assert_eq!(*observer.values.last().unwrap(), 1.0);
}

#[test]
fn unknown_frame_count_reports_one_at_end() {
    let mut source = VecSource::new(3, 0);
    let (sink, _log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![]);
    let mut observer = RecordingObserver::default();

    process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut observer,
    )
    .unwrap();
    assert_eq!(observer.values, vec![0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn undecodable_source_fails_without_output() {
    let mut source = VecSource::new(5, 5).failing_after(0);
    let (sink, log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![spark(0.9)]);

    let err = process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut NoProgress,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Source(SourceError::Decode { frame: 0, .. })));
    let log = log.lock().unwrap();
    assert!(!log.published);
    assert!(log.indices.is_empty());
}

#[test]
fn empty_source_publishes_nothing() {
    let mut source = VecSource::new(0, 0);
    let (sink, log) = MemorySink::new();

    let err = process(
        &mut source,
        sink,
        &mut StubDetector::new(vec![spark(0.9)]),
        &Thresholds::default(),
        "spark",
        &mut NoProgress,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Sink(SinkError::Empty)));
    assert!(!log.lock().unwrap().published);
}

#[test]
fn corrupt_container_is_rejected_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("broken.mp4");
    std::fs::write(&video, b"definitely not an mp4 container").unwrap();

    match FfmpegSource::open(&video) {
        Err(SourceError::Open { path, .. }) => assert_eq!(path, video),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("corrupt container should not open"),
    }
    // 只有输入文件本身
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn missing_video_is_rejected_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("missing.mov");
    assert!(matches!(
        FfmpegSource::open(&video),
        Err(SourceError::Open { .. })
    ));
}

#[test]
fn mid_run_decode_failure_flushes_and_reports_incomplete() {
    let mut source = VecSource::new(10, 10).failing_after(4);
    let (sink, log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![spark(0.8)]);

    let err = process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut NoProgress,
    )
    .unwrap_err();

    match err {
        PipelineError::Incomplete { summary, cause } => {
            assert_eq!(summary.frames_processed, 4);
            assert_eq!(summary.frames_written, 4);
            assert_eq!(summary.spark_count, 4);
            assert!(!summary.completed);
            assert!(matches!(cause, SourceError::Decode { frame: 4, .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    let log = log.lock().unwrap();
    assert!(log.published);
    assert_eq!(log.indices, vec![0, 1, 2, 3]);
}

#[test]
fn detector_failure_aborts_without_publishing() {
    let mut source = VecSource::new(10, 10);
    let (sink, log) = MemorySink::new();
    let mut detector = StubDetector::new(vec![spark(0.9)]);
    detector.fail_at = Some(3);

    let err = process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut NoProgress,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Detect { frame: 3, .. }));
    let log = log.lock().unwrap();
    assert!(!log.published);
    assert_eq!(log.indices, vec![0, 1, 2]);
}

#[test]
fn sink_failure_aborts_without_publishing() {
    let mut source = VecSource::new(10, 10);
    let (mut sink, log) = MemorySink::new();
    sink.fail_at = Some(5);
    let mut detector = StubDetector::new(vec![]);

    let err = process(
        &mut source,
        sink,
        &mut detector,
        &Thresholds::default(),
        "spark",
        &mut NoProgress,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Sink(SinkError::Write { frame: 5, .. })));
    assert!(!log.lock().unwrap().published);
}

#[test]
fn rerun_gives_identical_counts() {
    let thresholds = Thresholds::new(0.35, 0.4).unwrap();
    let run = || {
        let mut source = VecSource::new(40, 40);
        let (sink, _log) = MemorySink::new();
        process(
            &mut source,
            sink,
            &mut ContentDetector,
            &thresholds,
            "spark",
            &mut NoProgress,
        )
        .unwrap()
    };

    let first = run();
    let second = run();
    assert!(first.spark_count > 0);
    assert_eq!(first.spark_count, second.spark_count);
    assert_eq!(first.class_totals, second.class_totals);
}
