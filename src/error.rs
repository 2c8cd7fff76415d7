use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while building or executing a report query.
///
/// Every variant is local to one query execution; the provider map and the
/// exchange-rate table are never mutated on the error path.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No exchange rate from {source_currency} to {target_currency}")]
    MissingRate {
        source_currency: String,
        target_currency: String,
    },

    #[error("Currency conversion overflow converting {value} {source_currency} to {target_currency}")]
    ConversionOverflow {
        value: String,
        source_currency: String,
        target_currency: String,
    },

    #[error("Arithmetic overflow on {measure}")]
    Overflow { measure: String },

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl ReportError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for the failures a caller should surface as a currency validation error.
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            Self::MissingRate { .. } | Self::ConversionOverflow { .. }
        )
    }
}

pub type ReportResult<T> = Result<T, ReportError>;

/// `a + b` for the named measure, failing instead of panicking on overflow.
pub fn checked_add(a: Decimal, b: Decimal, measure: &str) -> ReportResult<Decimal> {
    a.checked_add(b).ok_or_else(|| ReportError::Overflow {
        measure: measure.to_string(),
    })
}

/// `a - b` for the named measure, failing instead of panicking on overflow.
pub fn checked_sub(a: Decimal, b: Decimal, measure: &str) -> ReportResult<Decimal> {
    a.checked_sub(b).ok_or_else(|| ReportError::Overflow {
        measure: measure.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_arithmetic_reports_measure() {
        let err = checked_add(Decimal::MAX, Decimal::ONE, "cost_total").unwrap_err();
        assert_eq!(err.to_string(), "Arithmetic overflow on cost_total");
        assert!(checked_sub(Decimal::MIN, Decimal::ONE, "usage").is_err());
        assert_eq!(checked_add(Decimal::ONE, Decimal::ONE, "usage").unwrap(), Decimal::TWO);
    }
}
