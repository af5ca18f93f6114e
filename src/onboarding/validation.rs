//! Per-field validation of raw chat input.

use chrono::NaiveDate;

use super::model::ProfileField;

/// Why an answer was rejected. The `Display` text is sent to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("生年月日は「YYYY-MM-DD」の形式で入力してください（例: 1990-01-23）")]
    InvalidDate,

    #[error("出生時刻は「HH:MM」の形式で入力してください（例: 14:30）。時は0〜23、分は0〜59です")]
    InvalidTime,

    #[error("{}を入力してください", .0.label())]
    Empty(ProfileField),
}

/// Validate `raw` for `field`, returning the value to store.
///
/// Dates and times are normalized (`1990-01-23`, `07:05`); free-text fields
/// are trimmed.
pub fn validate(field: ProfileField, raw: &str) -> Result<String, ValidationError> {
    let input = raw.trim();
    match field {
        ProfileField::BirthDate => validate_date(input),
        ProfileField::BirthTime => validate_time(input),
        ProfileField::BirthPlace | ProfileField::FullName => {
            if input.is_empty() {
                Err(ValidationError::Empty(field))
            } else {
                Ok(input.to_string())
            }
        }
    }
}

fn validate_date(input: &str) -> Result<String, ValidationError> {
    let bytes = input.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return Err(ValidationError::InvalidDate);
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|_| ValidationError::InvalidDate)
}

fn validate_time(input: &str) -> Result<String, ValidationError> {
    let parts: Vec<&str> = input.split(':').collect();
    let [hour, minute] = parts.as_slice() else {
        return Err(ValidationError::InvalidTime);
    };
    let hour: u32 = hour.trim().parse().map_err(|_| ValidationError::InvalidTime)?;
    let minute: u32 = minute.trim().parse().map_err(|_| ValidationError::InvalidTime)?;
    if hour > 23 || minute > 59 {
        return Err(ValidationError::InvalidTime);
    }
    Ok(format!("{hour:02}:{minute:02}"))
}
