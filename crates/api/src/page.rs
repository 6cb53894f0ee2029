//! HTML Page Rendering

use feature_engine::{MachineReading, MachineType};
use std::fmt::Write;

const STYLE: &str = r#"
body { font-family: Helvetica, Arial, sans-serif; background: #f4f6f8; color: #333; }
.OuterDiv { max-width: 1200px; margin: 0 auto; padding: 16px; }
.ContentDiv { display: flex; flex-wrap: wrap; gap: 24px; }
.InnerDiv { background: #fff; padding: 16px 24px; border-radius: 6px; min-width: 360px; }
.ParameterDiv { display: flex; gap: 12px; }
.LabelDiv label, .InputDiv input { display: block; height: 28px; line-height: 28px; margin-bottom: 6px; }
.ButtonDiv { margin-top: 12px; }
.ImageDiv { background: #fff; padding: 8px; border-radius: 6px; }
.error { color: #b00020; }
"#;

/// Raw form contents, echoed back into the inputs
#[derive(Debug, Clone, PartialEq)]
pub struct FormValues {
    pub air_temp: String,
    pub process_temp: String,
    pub rot_spd: String,
    pub trq: String,
    pub tool_wear: String,
    pub typ: MachineType,
}

impl From<&MachineReading> for FormValues {
    fn from(reading: &MachineReading) -> Self {
        Self {
            air_temp: reading.air_temperature_k.to_string(),
            process_temp: reading.process_temperature_k.to_string(),
            rot_spd: reading.rotational_speed_rpm.to_string(),
            trq: reading.torque_nm.to_string(),
            tool_wear: reading.tool_wear_min.to_string(),
            typ: reading.machine_type,
        }
    }
}

impl Default for FormValues {
    fn default() -> Self {
        Self::from(&MachineReading::default())
    }
}

/// Outcome of a successful submission
#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    /// `data:image/png;base64,...`
    pub chart_uri: String,
    pub prediction_text: String,
    pub probability_text: String,
}

/// Everything the page shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageView {
    pub form: FormValues,
    pub result: Option<ResultView>,
    pub error: Option<String>,
}

/// Escape text for HTML content and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn number_input(out: &mut String, name: &str, placeholder: &str, value: &str) {
    let _ = writeln!(
        out,
        r#"<input id="{name}" name="{name}" type="number" step="any" placeholder="{placeholder}" value="{value}" class="inputbox">"#,
        name = name,
        placeholder = placeholder,
        value = escape(value),
    );
}

/// Render the full page
pub fn render(view: &PageView) -> String {
    let form = &view.form;
    let mut inputs = String::new();
    number_input(&mut inputs, "air_temp", "Air temperature (K)", &form.air_temp);
    number_input(&mut inputs, "process_temp", "Process temperature (K)", &form.process_temp);
    number_input(&mut inputs, "rot_spd", "Rotational speed (rpm)", &form.rot_spd);
    number_input(&mut inputs, "trq", "Torque (Nm)", &form.trq);
    number_input(&mut inputs, "tool_wear", "Tool wear (min)", &form.tool_wear);

    let mut radios = String::new();
    for t in MachineType::ALL {
        let checked = if t == form.typ { " checked" } else { "" };
        let _ = write!(
            radios,
            r#"<label><input type="radio" name="typ" value="{t}"{checked}> {t}</label> "#,
            t = t.as_str(),
            checked = checked,
        );
    }

    let mut outcome = String::new();
    if let Some(error) = &view.error {
        let _ = writeln!(outcome, r#"<h2 id="error" class="error">{}</h2>"#, escape(error));
    }
    let image = match &view.result {
        Some(result) => {
            let _ = writeln!(outcome, r#"<h2 id="prediction">{}</h2>"#, escape(&result.prediction_text));
            let _ = writeln!(
                outcome,
                r#"<h2 id="prediction_proba">{}</h2>"#,
                escape(&result.probability_text)
            );
            format!(
                r#"<img id="graph" height="500" width="700" alt="SHAP waterfall chart" src="{}">"#,
                result.chart_uri
            )
        }
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Machine Failure Classification</title>
<style>{style}</style>
</head>
<body>
<div class="OuterDiv">
<h1>Machine Failure Classification</h1>
<div class="ContentDiv">
<form class="InnerDiv" method="post" action="/">
<h3 class="h3">Enter Parameters:</h3>
<div class="ParameterDiv">
<div class="LabelDiv">
<label for="air_temp">Air temperature (K): </label>
<label for="process_temp">Process temperature (K): </label>
<label for="rot_spd">Rotational speed (rpm): </label>
<label for="trq">Torque (Nm): </label>
<label for="tool_wear">Tool wear (min): </label>
<label>Type: </label>
</div>
<div class="InputDiv">
{inputs}<div id="typ">{radios}</div>
</div>
</div>
<div class="ButtonDiv"><button type="submit" id="my-button">Submit</button></div>
<div>
{outcome}</div>
</form>
<div class="ImageDiv">{image}</div>
</div>
</div>
</body>
</html>
"#,
        style = STYLE,
        inputs = inputs,
        radios = radios,
        outcome = outcome,
        image = image,
    )
}
