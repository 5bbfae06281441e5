use crate::error::DeriveError;
use crate::schema::ScoreRequest;

/// Age bins: `[18,30) [30,40) [40,50) [50,60) [60,inf)`, left-inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeGroup {
    From18To30,
    From30To40,
    From40To50,
    From50To60,
    Over60,
}

impl AgeGroup {
    pub const COLUMN: &'static str = "age_group";
    pub const ALL: [AgeGroup; 5] = [
        AgeGroup::From18To30,
        AgeGroup::From30To40,
        AgeGroup::From40To50,
        AgeGroup::From50To60,
        AgeGroup::Over60,
    ];

    pub fn from_age(age: f64) -> Result<Self, DeriveError> {
        let g = if age >= 60.0 {
            AgeGroup::Over60
        } else if age >= 50.0 {
            AgeGroup::From50To60
        } else if age >= 40.0 {
            AgeGroup::From40To50
        } else if age >= 30.0 {
            AgeGroup::From30To40
        } else if age >= 18.0 {
            AgeGroup::From18To30
        } else {
            return Err(DeriveError::OutOfRange {
                field: "person_age",
                bucket: Self::COLUMN,
                value: age,
                domain: "[18, inf)",
            });
        };
        Ok(g)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgeGroup::From18To30 => "18-30",
            AgeGroup::From30To40 => "30-40",
            AgeGroup::From40To50 => "40-50",
            AgeGroup::From50To60 => "50-60",
            AgeGroup::Over60 => "60+",
        }
    }
}

/// Loan amount bins: `(0,5000] (5000,10000] (10000,15000] (15000,inf)`.
///
/// Right-inclusive, unlike the age and income bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanAmountGroup {
    Small,
    Medium,
    Large,
    VeryLarge,
}

impl LoanAmountGroup {
    pub const COLUMN: &'static str = "loan_amnt_group";
    pub const ALL: [LoanAmountGroup; 4] = [
        LoanAmountGroup::Small,
        LoanAmountGroup::Medium,
        LoanAmountGroup::Large,
        LoanAmountGroup::VeryLarge,
    ];

    pub fn from_amount(amount: f64) -> Result<Self, DeriveError> {
        let g = if amount > 15_000.0 {
            LoanAmountGroup::VeryLarge
        } else if amount > 10_000.0 {
            LoanAmountGroup::Large
        } else if amount > 5_000.0 {
            LoanAmountGroup::Medium
        } else if amount > 0.0 {
            LoanAmountGroup::Small
        } else {
            return Err(DeriveError::OutOfRange {
                field: "loan_amnt",
                bucket: Self::COLUMN,
                value: amount,
                domain: "(0, inf)",
            });
        };
        Ok(g)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanAmountGroup::Small => "small",
            LoanAmountGroup::Medium => "medium",
            LoanAmountGroup::Large => "large",
            LoanAmountGroup::VeryLarge => "very large",
        }
    }
}

/// Income bins: `[0,20000) [20000,50000) [50000,100000) [100000,200000) [200000,inf)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomeGroup {
    Low,
    LowMiddle,
    Middle,
    HighMiddle,
    High,
}

impl IncomeGroup {
    pub const COLUMN: &'static str = "income_group";
    pub const ALL: [IncomeGroup; 5] = [
        IncomeGroup::Low,
        IncomeGroup::LowMiddle,
        IncomeGroup::Middle,
        IncomeGroup::HighMiddle,
        IncomeGroup::High,
    ];

    pub fn from_income(income: f64) -> Result<Self, DeriveError> {
        let g = if income >= 200_000.0 {
            IncomeGroup::High
        } else if income >= 100_000.0 {
            IncomeGroup::HighMiddle
        } else if income >= 50_000.0 {
            IncomeGroup::Middle
        } else if income >= 20_000.0 {
            IncomeGroup::LowMiddle
        } else if income >= 0.0 {
            IncomeGroup::Low
        } else {
            return Err(DeriveError::OutOfRange {
                field: "person_income",
                bucket: Self::COLUMN,
                value: income,
                domain: "[0, inf)",
            });
        };
        Ok(g)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IncomeGroup::Low => "low",
            IncomeGroup::LowMiddle => "low-middle",
            IncomeGroup::Middle => "middle",
            IncomeGroup::HighMiddle => "high-middle",
            IncomeGroup::High => "high",
        }
    }
}

/// Bucket labels the deriver can emit for a derived column, `None` for
/// columns it does not own.
pub fn bucket_labels(column: &str) -> Option<Vec<&'static str>> {
    match column {
        AgeGroup::COLUMN => Some(AgeGroup::ALL.iter().map(|g| g.as_str()).collect()),
        LoanAmountGroup::COLUMN => Some(LoanAmountGroup::ALL.iter().map(|g| g.as_str()).collect()),
        IncomeGroup::COLUMN => Some(IncomeGroup::ALL.iter().map(|g| g.as_str()).collect()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    pub loan_to_income: f64,
    pub loan_to_emp_length_ratio: f64,
    pub int_rate_to_loan_amnt_ratio: f64,
    pub age_group: AgeGroup,
    pub loan_amnt_group: LoanAmountGroup,
    pub income_group: IncomeGroup,
}

impl DerivedFeatures {
    /// Ratio columns in row order.
    pub fn ratio_columns(&self) -> [(&'static str, f64); 3] {
        [
            ("loan_to_income", self.loan_to_income),
            ("loan_to_emp_length_ratio", self.loan_to_emp_length_ratio),
            ("int_rate_to_loan_amnt_ratio", self.int_rate_to_loan_amnt_ratio),
        ]
    }
}

/// Computes the ratio and bucket features for one request.
///
/// - 数值输入必须有限；比值出现 inf/NaN（分母为 0）直接报错
/// - 分桶落在所有区间之外时报错，不产生缺失类别
pub fn derive(req: &ScoreRequest) -> Result<DerivedFeatures, DeriveError> {
    for (field, value) in req.numeric_columns() {
        if !value.is_finite() {
            return Err(DeriveError::NonFiniteInput { field, value });
        }
    }

    let loan_to_income = ratio("loan_to_income", req.loan_amnt, req.person_income)?;
    let loan_to_emp_length_ratio =
        ratio("loan_to_emp_length_ratio", req.person_emp_length, req.loan_amnt)?;
    let int_rate_to_loan_amnt_ratio =
        ratio("int_rate_to_loan_amnt_ratio", req.loan_int_rate, req.loan_amnt)?;

    Ok(DerivedFeatures {
        loan_to_income,
        loan_to_emp_length_ratio,
        int_rate_to_loan_amnt_ratio,
        age_group: AgeGroup::from_age(req.person_age)?,
        loan_amnt_group: LoanAmountGroup::from_amount(req.loan_amnt)?,
        income_group: IncomeGroup::from_income(req.person_income)?,
    })
}

#[inline]
fn ratio(feature: &'static str, num: f64, den: f64) -> Result<f64, DeriveError> {
    let value = num / den;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DeriveError::NonFiniteRatio { feature, value })
    }
}
