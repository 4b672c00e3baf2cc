//! LabelMe形式のアノテーション読み込みとラベル計算

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// ラベル抽出時のエラー
#[derive(Debug, Error, PartialEq)]
pub enum AnnotationError {
    #[error("annotation has no shapes")]
    NoShapes,
    #[error("first shape has no points")]
    NoPoints,
    #[error("centroid is not finite: {0}")]
    NonFinite(f64),
}

/// ポリゴン1個分
///
/// `points` 以外のフィールド（`shape_type` など）は無視します。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelmeShape {
    #[serde(default)]
    pub label: Option<String>,
    /// 頂点座標 `[x, y]`
    pub points: Vec<[f64; 2]>,
}

/// アノテーションファイル全体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelmeAnnotation {
    pub shapes: Vec<LabelmeShape>,
}

impl LabelmeAnnotation {
    /// JSONファイルから読み込む
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read annotation: {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse annotation: {}", path.display()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 最初のポリゴンのx座標の平均（重心ラベル）
    pub fn centroid_x(&self) -> Result<f32, AnnotationError> {
        let shape = self.shapes.first().ok_or(AnnotationError::NoShapes)?;
        if shape.points.is_empty() {
            return Err(AnnotationError::NoPoints);
        }

        let sum: f64 = shape.points.iter().map(|&[x, _]| x).sum();
        let mean = sum / shape.points.len() as f64;

        // f32への変換でのオーバーフローも検出する
        if !mean.is_finite() || !(mean as f32).is_finite() {
            return Err(AnnotationError::NonFinite(mean));
        }

        Ok(mean as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_is_mean_of_first_shape_x() {
        let json = r#"{
            "version": "5.2.1",
            "shapes": [
                {"label": "coupling", "points": [[10.0, 1.0], [20.0, 2.0], [36.0, 3.0]], "shape_type": "polygon"},
                {"label": "other", "points": [[1000.0, 0.0]]}
            ],
            "imagePath": "a.jpeg"
        }"#;
        let annotation = LabelmeAnnotation::from_json_str(json).unwrap();
        assert_eq!(annotation.centroid_x().unwrap(), 22.0);
    }

    #[test]
    fn test_empty_shapes() {
        let annotation = LabelmeAnnotation::from_json_str(r#"{"shapes": []}"#).unwrap();
        assert_eq!(annotation.centroid_x(), Err(AnnotationError::NoShapes));
    }

    #[test]
    fn test_empty_points() {
        let annotation =
            LabelmeAnnotation::from_json_str(r#"{"shapes": [{"points": []}]}"#).unwrap();
        assert_eq!(annotation.centroid_x(), Err(AnnotationError::NoPoints));
    }

    #[test]
    fn test_overflowing_centroid_is_rejected() {
        let annotation =
            LabelmeAnnotation::from_json_str(r#"{"shapes": [{"points": [[1e300, 0.0]]}]}"#)
                .unwrap();
        assert!(matches!(
            annotation.centroid_x(),
            Err(AnnotationError::NonFinite(_))
        ));
    }

    #[test]
    fn test_missing_shapes_field_fails_to_parse() {
        assert!(LabelmeAnnotation::from_json_str(r#"{"imagePath": "a.jpeg"}"#).is_err());
    }
}
