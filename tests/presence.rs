//! Presence detection integration tests
//!
//! The dwell rule is exercised with explicit instants; the threaded detector
//! runs against a blank camera and a scripted locator.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use threeb_kiosk::presence::{
    Camera, PresenceDetector, PresenceStatus, PresenceThresholds, PresenceTracker, STOP_TIMEOUT,
    TIME_TO_TRIGGER,
};
use threeb_kiosk::{FaceBox, FaceLocator, GrayFrame, Result};

mod common;
use common::{BlankSource, BrokenSource, FRAME, FaceScript, far_face, near_face};

fn tracker() -> PresenceTracker {
    PresenceTracker::new(PresenceThresholds::default())
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn test_short_dwell_never_fires() {
    for dwell in [0, 100, 500, 999] {
        let mut tracker = tracker();
        let t0 = Instant::now();
        let mut fired = 0;
        let mut t = 0;
        while t <= dwell {
            if tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t0 + ms(t)) {
                fired += 1;
            }
            t += 33;
        }
        assert_eq!(fired, 0, "fired after only {dwell} ms");
        assert_eq!(tracker.status(), PresenceStatus::Dwelling);
    }
}

#[test]
fn test_long_dwell_fires_exactly_once() {
    let mut tracker = tracker();
    let t0 = Instant::now();

    let fired = (0..=150)
        .filter(|i| tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t0 + ms(i * 33)))
        .count();

    assert_eq!(fired, 1);
    assert_eq!(tracker.status(), PresenceStatus::Triggered);
}

#[test]
fn test_fires_again_after_face_leaves() {
    let mut tracker = tracker();
    let t0 = Instant::now();

    assert!(!tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t0));
    assert!(tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t0 + TIME_TO_TRIGGER));

    assert!(!tracker.observe_faces(&[], FRAME.0, FRAME.1, t0 + ms(1100)));
    assert_eq!(tracker.status(), PresenceStatus::Idle);

    let t1 = t0 + ms(1200);
    assert!(!tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t1));
    assert!(tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t1 + TIME_TO_TRIGGER));
}

#[test]
fn test_dip_below_threshold_restarts_dwell() {
    let mut tracker = tracker();
    let t0 = Instant::now();

    assert!(!tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t0));
    assert!(!tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t0 + ms(800)));
    // Face stepped back: still detected, but too small
    assert!(!tracker.observe_faces(&[far_face()], FRAME.0, FRAME.1, t0 + ms(900)));
    assert_eq!(tracker.session().dwell_start, None);

    let restart = t0 + ms(1000);
    assert!(!tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, restart));
    assert_eq!(tracker.session().dwell_start, Some(restart));
    // 1.5 s after the first sighting, but only 0.5 s into the new dwell
    assert!(!tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t0 + ms(1500)));
    assert!(tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, restart + TIME_TO_TRIGGER));
}

#[test]
fn test_largest_face_decides() {
    let mut tracker = tracker();
    let t0 = Instant::now();

    tracker.observe_faces(&[far_face(), near_face()], FRAME.0, FRAME.1, t0);
    assert_eq!(tracker.status(), PresenceStatus::Dwelling);
}

#[test]
fn test_failed_frame_resets_dwell() {
    let mut tracker = tracker();
    let t0 = Instant::now();

    tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t0);
    tracker.observe_failure(t0 + ms(500));
    assert_eq!(tracker.status(), PresenceStatus::Idle);
    assert!(!tracker.observe_faces(&[near_face()], FRAME.0, FRAME.1, t0 + TIME_TO_TRIGGER));
}

fn detector(
    camera: &Arc<Camera>,
    script: &FaceScript,
    fired: &Arc<AtomicUsize>,
) -> PresenceDetector {
    let counter = Arc::clone(fired);
    PresenceDetector::new(
        Arc::clone(camera),
        script.locator(),
        PresenceThresholds {
            face_area_threshold: 0.20,
            time_to_trigger: ms(60),
        },
        ms(5),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    )
}

#[test]
fn test_detector_fires_once_and_keeps_camera_open() {
    let opens = Arc::new(AtomicUsize::new(0));
    let camera = Arc::new(Camera::new(Box::new(BlankSource {
        opens: Arc::clone(&opens),
    })));
    let script = FaceScript::default();
    script.set(vec![near_face()]);
    let fired = Arc::new(AtomicUsize::new(0));

    let mut detector = detector(&camera, &script, &fired);
    detector.start().unwrap();
    assert!(detector.is_active());
    std::thread::sleep(ms(400));

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(detector.status(), PresenceStatus::Triggered);
    assert_eq!(detector.faces(), vec![near_face()]);

    detector.stop();
    assert!(!detector.is_active());
    assert!(camera.is_running());
    assert_eq!(detector.status(), PresenceStatus::Idle);

    // Restarting begins a new episode on the same open camera
    detector.start().unwrap();
    std::thread::sleep(ms(400));
    detector.stop();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    camera.shutdown();
    assert!(!camera.is_running());
}

#[test]
fn test_detector_ignores_distant_faces() {
    let camera = Arc::new(Camera::new(Box::new(BlankSource::default())));
    let script = FaceScript::default();
    script.set(vec![far_face()]);
    let fired = Arc::new(AtomicUsize::new(0));

    let mut detector = detector(&camera, &script, &fired);
    detector.start().unwrap();
    std::thread::sleep(ms(300));
    detector.stop();

    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_detector_start_fails_without_camera() {
    let camera = Arc::new(Camera::new(Box::new(BrokenSource)));
    let fired = Arc::new(AtomicUsize::new(0));

    let mut detector = detector(&camera, &FaceScript::default(), &fired);
    assert!(detector.start().is_err());
    assert!(!detector.is_active());
}

/// Locator that takes far longer than a stop is allowed to wait
struct SlowLocator {
    calls: Arc<AtomicUsize>,
}

impl FaceLocator for SlowLocator {
    fn locate(&mut self, _frame: &GrayFrame) -> Result<Vec<FaceBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(ms(1500));
        Ok(vec![near_face()])
    }
}

#[test]
fn test_stop_is_bounded_with_slow_locator() {
    let camera = Arc::new(Camera::new(Box::new(BlankSource::default())));
    let calls = Arc::new(AtomicUsize::new(0));
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);

    let mut detector = PresenceDetector::new(
        Arc::clone(&camera),
        Box::new(SlowLocator {
            calls: Arc::clone(&calls),
        }),
        PresenceThresholds {
            face_area_threshold: 0.20,
            time_to_trigger: Duration::ZERO,
        },
        ms(5),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    detector.start().unwrap();
    std::thread::sleep(ms(50));

    let started = Instant::now();
    detector.stop();
    let took = started.elapsed();
    assert!(took < STOP_TIMEOUT + ms(100), "stop took {took:?}");
    assert!(!detector.is_active());
    assert_eq!(detector.status(), PresenceStatus::Idle);
    assert!(detector.faces().is_empty());

    // The detached run finishes its frame but neither fires nor loops again
    std::thread::sleep(ms(1700));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!detector.is_active());
}
