// crates/credit-core/src/schema.rs
use serde::{Deserialize, Serialize};

/// One applicant's raw attributes, as posted to the scoring endpoint.
///
/// Field names are the column names the model was trained with, so they stay
/// snake_case on the wire and in the feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub person_age: f64,
    pub person_income: f64,
    pub person_home_ownership: String,
    pub person_emp_length: f64,
    pub loan_intent: String,
    pub loan_amnt: f64,
    pub loan_int_rate: f64,
    pub loan_percent_income: f64,
    pub cb_person_default_on_file: String,
    pub cb_person_cred_hist_length: f64,
}

impl ScoreRequest {
    /// Numeric input columns in row order. Categorical fields are never part
    /// of the numeric block; they only enter the row through the encoder.
    pub fn numeric_columns(&self) -> [(&'static str, f64); 7] {
        [
            ("person_age", self.person_age),
            ("person_income", self.person_income),
            ("person_emp_length", self.person_emp_length),
            ("loan_amnt", self.loan_amnt),
            ("loan_int_rate", self.loan_int_rate),
            ("loan_percent_income", self.loan_percent_income),
            ("cb_person_cred_hist_length", self.cb_person_cred_hist_length),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Model output for the single input row, always a list.
    pub prediction: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[cfg(test)]
pub(crate) fn sample_request() -> ScoreRequest {
    ScoreRequest {
        person_age: 35.0,
        person_income: 40_000.0,
        person_home_ownership: "RENT".into(),
        person_emp_length: 5.0,
        loan_intent: "EDUCATION".into(),
        loan_amnt: 8_000.0,
        loan_int_rate: 10.5,
        loan_percent_income: 0.2,
        cb_person_default_on_file: "N".into(),
        cb_person_cred_hist_length: 4.0,
    }
}
