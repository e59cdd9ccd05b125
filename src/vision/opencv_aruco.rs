//! ArUco recognition through OpenCV's objdetect module

use super::marker::{MarkerDetection, MarkerDictionary, MarkerRecognizer};
use crate::error::{LakshyaError, Result};
use crate::stream::Frame;
use opencv::core::{Mat, Point2f, Vector};
use opencv::objdetect::{
    self, ArucoDetector, CornerRefineMethod, DetectorParameters, PredefinedDictionaryType,
    RefineParameters,
};
use opencv::prelude::*;

/// ArUco recognizer tuned for small, distant markers on a phone camera
pub struct OpenCvArucoRecognizer {
    detector: ArucoDetector,
    dictionary: MarkerDictionary,
}

impl OpenCvArucoRecognizer {
    pub fn new(dictionary: MarkerDictionary) -> Result<Self> {
        let dict = objdetect::get_predefined_dictionary(predefined(dictionary)?)
            .map_err(cv_error)?;

        let mut params = DetectorParameters::default().map_err(cv_error)?;
        params.set_adaptive_thresh_win_size_min(3);
        params.set_adaptive_thresh_win_size_max(23);
        params.set_adaptive_thresh_win_size_step(10);
        params.set_min_marker_perimeter_rate(0.03);
        params.set_max_marker_perimeter_rate(4.0);
        params.set_polygonal_approx_accuracy_rate(0.05);
        params.set_corner_refinement_method(CornerRefineMethod::CORNER_REFINE_SUBPIX as i32);
        params.set_corner_refinement_win_size(5);

        let refine = RefineParameters::new(10.0, 3.0, true).map_err(cv_error)?;
        let detector = ArucoDetector::new(&dict, &params, refine).map_err(cv_error)?;

        tracing::info!("OpenCV ArUco recognizer ready ({})", dictionary);
        Ok(Self {
            detector,
            dictionary,
        })
    }

    pub fn dictionary(&self) -> MarkerDictionary {
        self.dictionary
    }
}

impl MarkerRecognizer for OpenCvArucoRecognizer {
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<MarkerDetection>> {
        let gray = image::imageops::grayscale(frame.image());
        let mat = Mat::new_rows_cols_with_data(
            frame.height() as i32,
            frame.width() as i32,
            gray.as_raw().as_slice(),
        )
        .map_err(cv_error)?;

        let mut corners: Vector<Vector<Point2f>> = Vector::new();
        let mut ids: Vector<i32> = Vector::new();
        let mut rejected: Vector<Vector<Point2f>> = Vector::new();
        self.detector
            .detect_markers(&mat, &mut corners, &mut ids, &mut rejected)
            .map_err(cv_error)?;

        let mut out = Vec::with_capacity(ids.len());
        for (id, quad) in ids.iter().zip(corners.iter()) {
            if quad.len() != 4 {
                continue;
            }
            let mut pts = [[0.0f32; 2]; 4];
            for (slot, p) in pts.iter_mut().zip(quad.iter()) {
                *slot = [p.x, p.y];
            }
            out.push(MarkerDetection::new(id, pts));
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "opencv-aruco"
    }
}

fn cv_error(e: opencv::Error) -> LakshyaError {
    LakshyaError::Recognizer(e.to_string())
}

fn predefined(dictionary: MarkerDictionary) -> Result<PredefinedDictionaryType> {
    use PredefinedDictionaryType::*;
    Ok(match (dictionary.bits, dictionary.count) {
        (4, 50) => DICT_4X4_50,
        (4, 100) => DICT_4X4_100,
        (4, 250) => DICT_4X4_250,
        (4, 1000) => DICT_4X4_1000,
        (5, 50) => DICT_5X5_50,
        (5, 100) => DICT_5X5_100,
        (5, 250) => DICT_5X5_250,
        (5, 1000) => DICT_5X5_1000,
        (6, 50) => DICT_6X6_50,
        (6, 100) => DICT_6X6_100,
        (6, 250) => DICT_6X6_250,
        (6, 1000) => DICT_6X6_1000,
        (7, 50) => DICT_7X7_50,
        (7, 100) => DICT_7X7_100,
        (7, 250) => DICT_7X7_250,
        (7, 1000) => DICT_7X7_1000,
        _ => {
            return Err(LakshyaError::Recognizer(format!(
                "no OpenCV dictionary for {}",
                dictionary
            )));
        }
    })
}
