use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataframe::DataFrame;
use crate::error::{MlError, MlResult};
use crate::input::MlInput;
use crate::model::Model;

/// The ML engine as seen by the task runners.
///
/// Both calls are synchronous and CPU bound; callers are expected to run them
/// on a blocking thread. The input dataset is always an already resolved
/// data frame.
pub trait Engine: Send + Sync {
    /// Whether `function_name` names an algorithm this engine runs.
    fn supports(&self, function_name: &str) -> bool;

    fn predict(&self, input: &MlInput, model: &Model) -> MlResult<DataFrame>;

    fn train(&self, input: &MlInput) -> MlResult<Model>;
}

pub const LINEAR_REGRESSION: &str = "linear_regression";
pub const KMEANS: &str = "kmeans";

/// Engine shipped with the node: a couple of small algorithms so a cluster is
/// usable without plugging in anything else.
#[derive(Debug, Default, Clone)]
pub struct BuiltinEngine;

impl Engine for BuiltinEngine {
    fn supports(&self, function_name: &str) -> bool {
        matches!(function_name, LINEAR_REGRESSION | KMEANS)
    }

    fn predict(&self, input: &MlInput, model: &Model) -> MlResult<DataFrame> {
        let frame = frame_of(input)?;
        match input.function_name.as_str() {
            LINEAR_REGRESSION => linear_regression_predict(frame, &decode(model)?),
            KMEANS => kmeans_predict(frame, &decode(model)?),
            other => Err(unsupported(other)),
        }
    }

    fn train(&self, input: &MlInput) -> MlResult<Model> {
        let frame = frame_of(input)?;
        let content = match input.function_name.as_str() {
            LINEAR_REGRESSION => encode(&linear_regression_train(frame, &input.parameters)?)?,
            KMEANS => encode(&kmeans_train(frame, &input.parameters)?)?,
            other => return Err(unsupported(other)),
        };
        Ok(Model::new(input.function_name.clone(), 1, content))
    }
}

fn frame_of(input: &MlInput) -> MlResult<&DataFrame> {
    let frame = input
        .data_frame()
        .ok_or_else(|| MlError::EngineFailure("input dataset was not resolved".to_string()))?;
    if frame.is_empty() {
        return Err(MlError::EngineFailure("input data frame is empty".to_string()));
    }
    Ok(frame)
}

fn unsupported(name: &str) -> MlError {
    MlError::EngineFailure(format!("unsupported algorithm: {}", name))
}

fn encode<T: Serialize>(params: &T) -> MlResult<Vec<u8>> {
    serde_json::to_vec(params).map_err(|e| MlError::EngineFailure(format!("model encode: {e}")))
}

fn decode<T: for<'de> Deserialize<'de>>(model: &Model) -> MlResult<T> {
    serde_json::from_slice(&model.content)
        .map_err(|e| MlError::EngineFailure(format!("model {} is corrupted: {e}", model.id)))
}

fn param_f64(params: &Value, name: &str, default: f64) -> f64 {
    params.get(name).and_then(Value::as_f64).unwrap_or(default)
}

fn param_usize(params: &Value, name: &str, default: usize) -> usize {
    params
        .get(name)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

/* =========================
   Linear regression (batch gradient descent)
   ========================= */

#[derive(Debug, Serialize, Deserialize)]
struct LinearModel {
    features: Vec<String>,
    target: String,
    weights: Vec<f64>,
    bias: f64,
}

fn linear_regression_train(frame: &DataFrame, params: &Value) -> MlResult<LinearModel> {
    let target = params
        .get("target")
        .and_then(Value::as_str)
        .ok_or_else(|| MlError::EngineFailure("linear_regression needs a 'target' column".into()))?
        .to_string();
    let learning_rate = param_f64(params, "learning_rate", 0.01);
    let epochs = param_usize(params, "epochs", 1000);

    let y = frame.column(&target).map_err(to_engine)?;
    let x = frame.drop_column(&target).map_err(to_engine)?;
    if x.width() == 0 {
        return Err(MlError::EngineFailure("no feature columns left".into()));
    }

    let n = x.len() as f64;
    let mut weights = vec![0.0; x.width()];
    let mut bias = 0.0;

    for _ in 0..epochs {
        let mut grad_w = vec![0.0; weights.len()];
        let mut grad_b = 0.0;

        for (row, target_value) in x.rows.iter().zip(&y) {
            let err = dot(&weights, row) + bias - target_value;
            for (g, v) in grad_w.iter_mut().zip(row) {
                *g += err * v;
            }
            grad_b += err;
        }

        for (w, g) in weights.iter_mut().zip(&grad_w) {
            *w -= learning_rate * g / n;
        }
        bias -= learning_rate * grad_b / n;
    }

    if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
        return Err(MlError::EngineFailure(
            "linear_regression diverged, lower the learning_rate".into(),
        ));
    }

    Ok(LinearModel {
        features: x.columns,
        target,
        weights,
        bias,
    })
}

fn linear_regression_predict(frame: &DataFrame, model: &LinearModel) -> MlResult<DataFrame> {
    let x = frame.select(&model.features).map_err(to_engine)?;
    let rows = x
        .rows
        .iter()
        .map(|row| vec![dot(&model.weights, row) + model.bias])
        .collect();
    DataFrame::new(vec!["prediction".to_string()], rows)
}

/* =========================
   K-means (Lloyd iterations)
   ========================= */

#[derive(Debug, Serialize, Deserialize)]
struct KMeansModel {
    columns: Vec<String>,
    centroids: Vec<Vec<f64>>,
}

fn kmeans_train(frame: &DataFrame, params: &Value) -> MlResult<KMeansModel> {
    let k = param_usize(params, "k", 2);
    let iterations = param_usize(params, "iterations", 10);

    if k == 0 || frame.len() < k {
        return Err(MlError::EngineFailure(format!(
            "kmeans needs at least k={} rows, got {}",
            k,
            frame.len()
        )));
    }

    // first k rows seed the centroids, keeps runs deterministic
    let mut centroids: Vec<Vec<f64>> = frame.rows.iter().take(k).cloned().collect();

    for _ in 0..iterations {
        let mut sums = vec![vec![0.0; frame.width()]; k];
        let mut counts = vec![0usize; k];

        for row in &frame.rows {
            let c = nearest(&centroids, row);
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(row) {
                *s += v;
            }
        }

        let mut moved = false;
        for (idx, centroid) in centroids.iter_mut().enumerate() {
            if counts[idx] == 0 {
                continue;
            }
            let next: Vec<f64> = sums[idx].iter().map(|s| s / counts[idx] as f64).collect();
            if next != *centroid {
                moved = true;
                *centroid = next;
            }
        }
        if !moved {
            break;
        }
    }

    Ok(KMeansModel {
        columns: frame.columns.clone(),
        centroids,
    })
}

fn kmeans_predict(frame: &DataFrame, model: &KMeansModel) -> MlResult<DataFrame> {
    let x = frame.select(&model.columns).map_err(to_engine)?;
    let rows = x
        .rows
        .iter()
        .map(|row| vec![nearest(&model.centroids, row) as f64])
        .collect();
    DataFrame::new(vec!["cluster_id".to_string()], rows)
}

/* =========================
   helpers
   ========================= */

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(centroids: &[Vec<f64>], row: &[f64]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (idx, c) in centroids.iter().enumerate() {
        let d = squared_distance(c, row);
        if d < best_dist {
            best = idx;
            best_dist = d;
        }
    }
    best
}

fn to_engine(err: MlError) -> MlError {
    match err {
        MlError::EngineFailure(_) => err,
        other => MlError::EngineFailure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputDataset;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn input(function_name: &str, frame: DataFrame, parameters: Value) -> MlInput {
        MlInput {
            function_name: function_name.to_string(),
            parameters,
            input_dataset: InputDataset::DataFrame { data_frame: frame },
        }
    }

    #[test]
    fn linear_regression_learns_a_line() {
        let rows = (0..5).map(|x| vec![x as f64, 2.0 * x as f64 + 1.0]).collect();
        let frame = DataFrame::new(vec!["x".into(), "y".into()], rows).unwrap();
        let params = json!({"target": "y", "learning_rate": 0.05, "epochs": 5000});

        let engine = BuiltinEngine;
        let model = engine
            .train(&input(LINEAR_REGRESSION, frame, params.clone()))
            .unwrap();
        assert_eq!(model.name, LINEAR_REGRESSION);

        let query = DataFrame::new(vec!["x".into()], vec![vec![10.0]]).unwrap();
        let out = engine
            .predict(&input(LINEAR_REGRESSION, query, params), &model)
            .unwrap();

        assert_eq!(out.columns, vec!["prediction"]);
        assert!((out.rows[0][0] - 21.0).abs() < 0.01, "got {}", out.rows[0][0]);
    }

    #[test]
    fn linear_regression_needs_target() {
        let frame = DataFrame::new(vec!["x".into()], vec![vec![1.0]]).unwrap();
        let res = BuiltinEngine.train(&input(LINEAR_REGRESSION, frame, json!({})));
        assert_matches!(res, Err(MlError::EngineFailure(_)));
    }

    #[test]
    fn kmeans_separates_two_groups() {
        let frame = DataFrame::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![10.0, 10.0],
                vec![10.0, 11.0],
            ],
        )
        .unwrap();
        let engine = BuiltinEngine;
        let model = engine
            .train(&input(KMEANS, frame.clone(), json!({"k": 2})))
            .unwrap();
        let out = engine
            .predict(&input(KMEANS, frame, json!({})), &model)
            .unwrap();

        let ids: Vec<f64> = out.rows.iter().map(|r| r[0]).collect();
        assert_eq!(ids[0], ids[1]);
        assert_eq!(ids[2], ids[3]);
        assert_ne!(ids[0], ids[2]);
    }

    #[test]
    fn kmeans_with_too_few_rows_fails() {
        let frame = DataFrame::new(vec!["a".into()], vec![vec![1.0]]).unwrap();
        let res = BuiltinEngine.train(&input(KMEANS, frame, json!({"k": 3})));
        assert_matches!(res, Err(MlError::EngineFailure(msg)) if msg.contains("k=3"));
    }

    #[test]
    fn unknown_algorithm_is_an_engine_failure() {
        let frame = DataFrame::new(vec!["a".into()], vec![vec![1.0]]).unwrap();
        let res = BuiltinEngine.train(&input("svm", frame, Value::Null));
        assert_matches!(res, Err(MlError::EngineFailure(msg)) if msg.contains("svm"));
        assert!(!BuiltinEngine.supports("svm"));
        assert!(BuiltinEngine.supports(KMEANS));
    }

    #[test]
    fn corrupted_model_content() {
        let frame = DataFrame::new(vec!["a".into()], vec![vec![1.0]]).unwrap();
        let model = Model::new(KMEANS, 1, b"not json".to_vec());
        let res = BuiltinEngine.predict(&input(KMEANS, frame, Value::Null), &model);
        assert_matches!(res, Err(MlError::EngineFailure(msg)) if msg.contains("corrupted"));
    }
}
