#![cfg(feature = "ml")]

use burn::tensor::Tensor;
use burn_ndarray::{NdArray, NdArrayDevice};
use coupling_detector_lib::dataset::{image_to_chw, Normalization};
use coupling_detector_lib::ml::{model_to_bytes, CouplingDetector, ModelConfig};
use coupling_detector_lib::model::{save_model_with_metadata, ModelMetadata};
use image::{Rgb, RgbImage};

type TestBackend = NdArray<f32>;

fn gradient_image(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 128]))
}

#[test]
fn saved_model_reproduces_predictions() {
    let temp = tempfile::tempdir().unwrap();
    let device = NdArrayDevice::Cpu;

    let config = ModelConfig::new().with_image_size(32).with_hidden_units(8);
    let model = config.init::<TestBackend>(&device);

    let image = gradient_image(32);
    let data = image_to_chw(&image, Normalization::UnitRange);
    let input = Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device).reshape([1, 3, 32, 32]);
    let expected: f32 = model.forward(input).into_data().to_vec::<f32>().unwrap()[0];

    let metadata = ModelMetadata::new(32, Normalization::UnitRange, 8, 1, 2, 1e-3, 4);
    let path = save_model_with_metadata(
        &temp.path().join("coupling_detector_model"),
        &metadata,
        &model_to_bytes(model).unwrap(),
    )
    .unwrap();

    let detector = CouplingDetector::<TestBackend>::load(&path, device).unwrap();
    assert_eq!(detector.metadata(), &metadata);

    let predicted = detector.predict_rgb(&image).unwrap();
    assert!((predicted - expected).abs() < 1e-4, "{predicted} != {expected}");

    image.save(temp.path().join("frame.png")).unwrap();
    let from_file = detector.predict_image(temp.path().join("frame.png")).unwrap();
    assert!((from_file - expected).abs() < 1e-4);
}

#[test]
fn predict_resizes_larger_inputs() {
    let temp = tempfile::tempdir().unwrap();
    let device = NdArrayDevice::Cpu;

    let model = ModelConfig::new()
        .with_image_size(32)
        .with_hidden_units(8)
        .init::<TestBackend>(&device);
    let metadata = ModelMetadata::new(32, Normalization::Raw, 8, 1, 2, 1e-3, 4);
    let path = save_model_with_metadata(
        &temp.path().join("model.tar.gz"),
        &metadata,
        &model_to_bytes(model).unwrap(),
    )
    .unwrap();

    let detector = CouplingDetector::<TestBackend>::load(&path, device).unwrap();
    let paths = [temp.path().join("a.png"), temp.path().join("b.png")];
    gradient_image(100).save(&paths[0]).unwrap();
    gradient_image(32).save(&paths[1]).unwrap();

    let predictions = detector.predict_batch(&paths).unwrap();
    assert_eq!(predictions.len(), 2);
    assert!(predictions.iter().all(|p| p.is_finite()));
}
