//! Prediction Routes

use axum::{extract::State, response::Html, Form};
use feature_engine::{FeatureError, FeatureVector, MachineReading, MachineType};
use inference_engine::Prediction;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use waterfall_chart::{to_data_uri, ChartError};

use crate::error::ApiError;
use crate::page::{self, FormValues, PageView, ResultView};
use crate::AppState;

/// Submitted form fields; empty or missing numbers fall back to placeholders
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MachineForm {
    #[serde(default)]
    pub air_temp: Option<String>,
    #[serde(default)]
    pub process_temp: Option<String>,
    #[serde(default)]
    pub rot_spd: Option<String>,
    #[serde(default)]
    pub trq: Option<String>,
    #[serde(default)]
    pub tool_wear: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
}

fn field_or(raw: &Option<String>, placeholder: f64) -> String {
    match raw.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => placeholder.to_string(),
    }
}

impl MachineForm {
    /// Resolve the type selector; anything outside the three labels is a bad request
    pub fn machine_type(&self) -> Result<MachineType, ApiError> {
        match self.typ.as_deref().map(str::trim) {
            None | Some("") => Ok(MachineType::default()),
            Some(label) => label
                .parse()
                .map_err(|e: FeatureError| ApiError::BadRequest(e.to_string())),
        }
    }

    /// Form values with placeholders substituted
    pub fn values(&self) -> Result<FormValues, ApiError> {
        let defaults = MachineReading::default();
        Ok(FormValues {
            air_temp: field_or(&self.air_temp, defaults.air_temperature_k),
            process_temp: field_or(&self.process_temp, defaults.process_temperature_k),
            rot_spd: field_or(&self.rot_spd, defaults.rotational_speed_rpm),
            trq: field_or(&self.trq, defaults.torque_nm),
            tool_wear: field_or(&self.tool_wear, defaults.tool_wear_min),
            typ: self.machine_type()?,
        })
    }
}

fn invalid(message: String, form: FormValues) -> ApiError {
    metrics::counter!("failure_explainer_rejected_inputs_total").increment(1);
    warn!("Rejected input: {}", message);
    ApiError::InvalidInput {
        message,
        form: Box::new(form),
    }
}

/// Parse echoed form values into a reading
pub fn parse_reading(form: &FormValues) -> Result<MachineReading, ApiError> {
    let number = |label: &str, raw: &str| -> Result<f64, ApiError> {
        raw.parse::<f64>()
            .map_err(|_| invalid(format!("{} must be a number, got {:?}", label, raw), form.clone()))
    };

    Ok(MachineReading {
        air_temperature_k: number("Air temperature", &form.air_temp)?,
        process_temperature_k: number("Process temperature", &form.process_temp)?,
        rotational_speed_rpm: number("Rotational speed", &form.rot_spd)?,
        torque_nm: number("Torque", &form.trq)?,
        tool_wear_min: number("Tool wear", &form.tool_wear)?,
        machine_type: form.typ,
    })
}

/// Prediction label line
pub fn prediction_text(prediction: &Prediction) -> String {
    format!("Model Prediction is: {}", prediction.label.as_str())
}

/// Probability line, as a percentage with two decimals
pub fn probability_text(prediction: &Prediction) -> String {
    format!(
        "Machine Failure Probability is: {:.2}%",
        prediction.probability * 100.0
    )
}

/// Explain, render and classify one encoded reading
pub async fn evaluate(
    state: &Arc<AppState>,
    reading: MachineReading,
    features: FeatureVector,
) -> Result<PageView, ApiError> {
    let start = Instant::now();

    let worker = Arc::clone(state);
    let (prediction, chart_uri) = tokio::task::spawn_blocking(move || -> Result<_, ChartError> {
        let explanation = worker.engine.explain(&features);
        let png = worker.chart.render(&explanation)?;
        let prediction = worker.engine.classify(&features);
        Ok((prediction, to_data_uri(&png)))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("prediction task failed: {}", e)))??;

    let elapsed = start.elapsed();
    metrics::counter!("failure_explainer_predictions_total", "label" => prediction.label.as_str())
        .increment(1);
    metrics::histogram!("failure_explainer_request_seconds").record(elapsed.as_secs_f64());
    debug!(
        "Prediction {} (p={:.4}) for {} in {}ms",
        prediction.label.as_str(),
        prediction.probability,
        reading.machine_type,
        elapsed.as_millis()
    );

    Ok(PageView {
        form: FormValues::from(&reading),
        result: Some(ResultView {
            chart_uri,
            prediction_text: prediction_text(&prediction),
            probability_text: probability_text(&prediction),
        }),
        error: None,
    })
}

/// Show the form with the placeholder reading already evaluated
pub async fn show_form(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let reading = MachineReading::default();
    let features = FeatureVector::encode(&reading).map_err(|e| ApiError::Internal(e.to_string()))?;
    let view = evaluate(&state, reading, features).await?;
    Ok(Html(page::render(&view)))
}

/// Predict, explain and render the chart for one submission
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Form(submitted): Form<MachineForm>,
) -> Result<Html<String>, ApiError> {
    let form = submitted.values()?;
    let reading = parse_reading(&form)?;
    let features = FeatureVector::encode(&reading).map_err(|e| invalid(e.to_string(), form.clone()))?;

    let view = evaluate(&state, reading, features).await?;
    Ok(Html(page::render(&view)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::FailureLabel;

    fn form(pairs: &[(&str, &str)]) -> MachineForm {
        let mut f = MachineForm::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "air_temp" => f.air_temp = v,
                "process_temp" => f.process_temp = v,
                "rot_spd" => f.rot_spd = v,
                "trq" => f.trq = v,
                "tool_wear" => f.tool_wear = v,
                "typ" => f.typ = v,
                _ => unreachable!(),
            }
        }
        f
    }

    #[test]
    fn test_empty_fields_use_placeholders() {
        let values = form(&[("air_temp", ""), ("typ", "Type_H")]).values().unwrap();
        let reading = parse_reading(&values).unwrap();

        assert_eq!(
            reading,
            MachineReading {
                machine_type: MachineType::H,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_bad_request() {
        assert!(matches!(
            form(&[("typ", "Type_Z")]).values(),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_non_numeric_is_invalid_input() {
        let values = form(&[("trq", "fifty")]).values().unwrap();
        match parse_reading(&values) {
            Err(ApiError::InvalidInput { message, form }) => {
                assert!(message.contains("Torque"));
                assert_eq!(form.trq, "fifty");
            }
            other => panic!("expected invalid input, got {:?}", other),
        }
    }

    #[test]
    fn test_output_strings() {
        let prediction = Prediction {
            label: FailureLabel::NoFailure,
            probability: 0.051717,
            margin: -2.91,
        };
        assert_eq!(prediction_text(&prediction), "Model Prediction is: No Failure");
        assert_eq!(probability_text(&prediction), "Machine Failure Probability is: 5.17%");

        let certain = Prediction {
            label: FailureLabel::Failure,
            probability: 1.0,
            margin: 40.0,
        };
        assert_eq!(probability_text(&certain), "Machine Failure Probability is: 100.00%");
    }
}
