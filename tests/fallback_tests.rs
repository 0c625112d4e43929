//! Output sizing for frames with and without a declared content size.

mod common;

use common::{frame_without_content_size, sample_bytes, service_over, RecordingModule, DST_TOO_SMALL};
use zbridge::abi::error_status;
use zbridge::{DecompressOptions, Error, NativeModule, SizeHint};

fn recording() -> (RecordingModule<NativeModule>, std::sync::Arc<std::sync::Mutex<common::CallLog>>) {
    RecordingModule::new(NativeModule::new(16, 1024))
}

#[tokio::test]
async fn test_unknown_size_uses_default_heap_size() {
    let (module, log) = recording();
    let codec = service_over(module).await;
    let data = sample_bytes(3000);
    let frame = frame_without_content_size(&data);

    assert_eq!(codec.frame_size_hint(&frame).unwrap(), SizeHint::Unknown);
    let back = codec.decompress(&frame, DecompressOptions::default()).unwrap();
    assert_eq!(back, data);

    let log = log.lock().unwrap();
    assert_eq!(log.decompress_caps, vec![1024 * 1024]);
    assert!(log.mallocs.contains(&(1024 * 1024)));
}

#[tokio::test]
async fn test_unknown_size_honours_custom_heap_size() {
    let (module, log) = recording();
    let codec = service_over(module).await;
    let data = sample_bytes(1000);
    let frame = frame_without_content_size(&data);

    let back = codec
        .decompress(&frame, DecompressOptions::with_default_heap_size(8192))
        .unwrap();
    assert_eq!(back, data);
    assert_eq!(log.lock().unwrap().decompress_caps, vec![8192]);
}

#[tokio::test]
async fn test_known_size_allocates_exactly_that() {
    let (module, log) = recording();
    let codec = service_over(module).await;
    let data = sample_bytes(12_345);
    let frame = codec.compress(&data, None).unwrap();

    assert_eq!(codec.frame_size_hint(&frame).unwrap(), SizeHint::Known(12_345));
    codec
        .decompress(&frame, DecompressOptions::with_default_heap_size(16))
        .unwrap();
    assert_eq!(log.lock().unwrap().decompress_caps, vec![12_345]);
}

#[tokio::test]
async fn test_unknown_size_larger_than_heap_fails_loudly() {
    let (module, log) = recording();
    let codec = service_over(module).await;
    let frame = frame_without_content_size(&sample_bytes(4096));

    let err = codec
        .decompress(&frame, DecompressOptions::with_default_heap_size(2048))
        .unwrap_err();
    match err {
        Error::Codec { operation, code } => {
            assert_eq!(operation, "decompress");
            assert_eq!(code, error_status(DST_TOO_SMALL) as u64);
        }
        other => panic!("expected codec error, got {other}"),
    }
    assert!(log.lock().unwrap().live.is_empty());
    assert!(codec.ledger().is_balanced());
}

#[tokio::test]
async fn test_zero_heap_size_is_configuration_error() {
    let (module, log) = recording();
    let codec = service_over(module).await;
    let err = codec
        .decompress(b"anything", DecompressOptions::with_default_heap_size(0))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(log.lock().unwrap().mallocs.is_empty());
}
