//! End to end flows over scripted transports.

use std::path::PathBuf;
use std::sync::Arc;

use trcc::discovery::{classify, Candidate};
use trcc::probe_cache::{cache_key, ProbeCache};
use trcc::session::{probe_led, DeviceSession};
use trcc::{DeviceError, DeviceHandle, DeviceProtocol, ProtocolKind};
use trcc_core::frame::frame_len;
use trcc_core::mock::{MockTransport, RecordingSleep};
use trcc_led::HidLed;
use trcc_scsi::mock::MockScsi;
use trcc_scsi::{cdb, ScsiLcd};

fn led_response(pm: u8, sub: u8) -> Vec<u8> {
    let mut resp = vec![0u8; 64];
    resp[..4].copy_from_slice(&[0xDA, 0xDB, 0xDC, 0xDD]);
    resp[5] = sub;
    resp[6] = pm;
    resp[12] = 0x01;
    resp
}

fn led_candidate(bus_path: &str) -> Candidate {
    Candidate {
        vendor_id: 0x0416,
        product_id: 0x8001,
        bus_path: Some(bus_path.into()),
        handle: DeviceHandle::Usb { bus: 3, address: 7 },
    }
}

fn led(mock: &MockTransport) -> HidLed {
    HidLed::new(mock.clone()).with_sleep(Arc::new(RecordingSleep::new()))
}

#[test]
fn frozen_warframe_streams_over_scsi() {
    let devices = classify(vec![Candidate {
        vendor_id: 0x0402,
        product_id: 0x3922,
        bus_path: Some("2-1.4".into()),
        handle: DeviceHandle::ScsiNode(PathBuf::from("/dev/sg2")),
    }]);
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].kind, ProtocolKind::Scsi);

    let mock = MockScsi::new();
    let mut poll = vec![0u8; trcc_scsi::consts::IO_SIZE];
    poll[0] = b'e';
    mock.push_read(poll);
    let sleep = RecordingSleep::new();
    let lcd = ScsiLcd::new(mock.clone()).with_sleep(Arc::new(sleep.clone()));
    let session = DeviceSession::new(devices[0].clone(), Box::new(lcd));

    let dir = tempfile::tempdir().unwrap();
    let mut cache = ProbeCache::open(dir.path().join("cache.toml"));
    let result = session.handshake(&mut cache).unwrap();
    assert_eq!(result.resolution(), Some((320, 320)));
    // One poll, no boot wait
    assert_eq!(mock.reads(), 1);
    assert!(!sleep.slept().contains(&trcc_scsi::consts::BOOT_WAIT));
    // Panels are not cached
    assert!(cache.is_empty());

    session
        .send_image(&image::RgbImage::from_pixel(320, 320, image::Rgb([255, 0, 0])))
        .unwrap();
    let writes = mock.writes();
    // init + four chunks
    assert_eq!(writes.len(), 5);
    let sizes: Vec<usize> = writes[1..].iter().map(|w| w.data.len()).collect();
    assert_eq!(sizes, vec![65536, 65536, 65536, 8192]);
    assert_eq!(sizes.iter().sum::<usize>(), frame_len((320, 320)));
    for (i, write) in writes[1..].iter().enumerate() {
        assert_eq!(write.cdb[..4], [0xF5, 0x01, 0x01, i as u8]);
    }
    // Big-endian red on 320x320
    assert_eq!(&writes[1].data[..2], &[0xF8, 0x00]);

    session.clear().unwrap();
    assert_eq!(mock.writes().last().unwrap().cdb, cdb::clear());
}

#[test]
fn led_handshake_is_cached_once_per_power_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("probe_cache.toml");
    let descriptor = classify(vec![led_candidate("3-2")]).remove(0);
    assert_eq!(descriptor.kind, ProtocolKind::HidLed);

    // First run: live handshake, PM at offset 6
    let mock = MockTransport::new();
    mock.push_read(led_response(3, 0));
    let mut first = led(&mock);
    let mut cache = ProbeCache::open(&cache_path);
    let result = probe_led(&descriptor, &mut first, &mut cache).unwrap();
    let topology = *result.topology().unwrap();
    assert_eq!(
        (topology.led_count, topology.segment_count, topology.zone_count),
        (30, 10, 1)
    );
    assert_eq!(result.model.as_deref(), Some("AX120_DIGITAL"));

    // Same power cycle, no cache: the controller stays silent
    let mut uncached = led(&mock);
    let mut empty = ProbeCache::open(dir.path().join("other.toml"));
    let err = probe_led(&descriptor, &mut uncached, &mut empty).unwrap_err();
    assert!(matches!(err, DeviceError::HandshakeFailed { .. }), "{err}");

    // Next process start: the cache answers without any I/O
    let silent = MockTransport::new();
    let mut next = led(&silent);
    let mut reopened = ProbeCache::open(&cache_path);
    let cached = probe_led(&descriptor, &mut next, &mut reopened).unwrap();
    assert_eq!(cached, result);
    assert_eq!(silent.io_count(), 0);

    // And the restored session can drive colours straight away
    next.send_frame(&[255, 255, 255]).unwrap();
    assert!(silent.io_count() > 0);
}

#[test]
fn plain_key_serves_any_bus() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = ProbeCache::open(dir.path().join("probe_cache.toml"));
    let mock = MockTransport::new();
    mock.push_read(led_response(128, 129));
    let result = led(&mock).handshake().unwrap();
    cache
        .store(&cache_key(0x0416, 0x8001, None), &result)
        .unwrap();

    let descriptor = classify(vec![led_candidate("1-7")]).remove(0);
    let silent = MockTransport::new();
    let cached = probe_led(&descriptor, &mut led(&silent), &mut cache).unwrap();
    assert_eq!(cached.topology().unwrap().style_id, 13);
    assert_eq!(silent.io_count(), 0);
}
