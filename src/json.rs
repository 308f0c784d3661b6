use duckdb::{
    Result,
    core::{DataChunkHandle, LogicalTypeHandle, LogicalTypeId},
    vscalar::{ScalarFunctionSignature, VScalar},
    vtab::arrow::WritableVector,
};
use serde_json::json;
use std::error::Error;

use crate::duckdb_impl::scalar::{
    invoke_binary_varchar_double_to_varchar, invoke_unary_varchar_to_varchar,
};
use crate::metrics::{BlunderThreshold, GameMetrics, SideSplit, extract_evaluations};

pub fn evaluations_to_json(movetext: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(extract_evaluations(movetext).as_slice())
}

pub fn metrics_to_json(metrics: &GameMetrics) -> String {
    json!({
        "num_evals": metrics.num_evals,
        "num_moves": metrics.loss.num_moves,
        "acpl_white": metrics.loss.acpl_white,
        "acpl_black": metrics.loss.acpl_black,
        "blunders_white": metrics.blunders.white,
        "blunders_black": metrics.blunders.black,
    })
    .to_string()
}

pub struct ChessEvalsJsonScalar;

impl VScalar for ChessEvalsJsonScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_unary_varchar_to_varchar(input, output, |movetext| {
            Ok(evaluations_to_json(movetext)?)
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }
}

pub struct ChessMetricsJsonScalar;

impl VScalar for ChessMetricsJsonScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_binary_varchar_double_to_varchar(input, output, |movetext, threshold| {
            let threshold = BlunderThreshold::new(threshold)?;
            let metrics = GameMetrics::compute(movetext, threshold, SideSplit::default());
            Ok(metrics_to_json(&metrics))
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
                LogicalTypeHandle::from(LogicalTypeId::Double),
            ],
            LogicalTypeHandle::from(LogicalTypeId::Varchar),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_evaluations_json_array() {
        let json = evaluations_to_json("1. e4 { [%eval 0.17] } 1... c5 { [%eval -0.5] }").unwrap();
        assert_eq!(json, "[0.17,-0.5]");
    }

    #[test]
    fn test_evaluations_json_empty_for_plain_movetext() {
        assert_eq!(evaluations_to_json("1. e4 e5 2. Nf3 *").unwrap(), "[]");
    }

    #[test]
    fn test_metrics_json_fields() {
        let movetext = "1. e4 { [%eval 0.0] } 1... e5 { [%eval 0.02] } \
                        2. Qh5 { [%eval 3.17] } 2... Nc6 { [%eval 3.01] }";
        let metrics = GameMetrics::compute(
            movetext,
            BlunderThreshold::new(1.5).unwrap(),
            SideSplit::default(),
        );
        let parsed: Value = serde_json::from_str(&metrics_to_json(&metrics)).unwrap();

        assert_eq!(parsed["num_evals"], 4);
        assert_eq!(parsed["num_moves"], 1);
        assert_eq!(parsed["blunders_white"], 1);
        assert_eq!(parsed["blunders_black"], 0);
        let acpl_white = parsed["acpl_white"].as_f64().unwrap();
        assert!((acpl_white - 315.0).abs() < 1e-6);
    }

    #[test]
    fn test_metrics_json_undefined_acpl_is_null() {
        let metrics = GameMetrics::compute(
            "1. e4 { [%eval 0.2] }",
            BlunderThreshold::new(1.5).unwrap(),
            SideSplit::default(),
        );
        let parsed: Value = serde_json::from_str(&metrics_to_json(&metrics)).unwrap();
        assert!(parsed["acpl_white"].is_null());
        assert!(parsed["acpl_black"].is_null());
        assert_eq!(parsed["num_moves"], 0);
    }
}
