use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaurelError {
    #[error(
        "no certificate template for category {category:?} and award level {award_level:?}{}",
        fallback_suffix(.fallback_award_level)
    )]
    TemplateNotFound {
        category: String,
        award_level: String,
        fallback_award_level: Option<String>,
    },
    #[error("malformed template: {0}")]
    MalformedTemplate(String),
    #[error("field {field} failed to render: {message}")]
    FieldRender { field: String, message: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("asset error: {0}")]
    Asset(String),
    #[error("pdf error: {0}")]
    Pdf(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn fallback_suffix(fallback: &Option<String>) -> String {
    match fallback {
        Some(level) => format!(" (fallback {level:?})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_not_found_names_every_lookup_key() {
        let err = LaurelError::TemplateNotFound {
            category: "机器人".to_string(),
            award_level: "二等奖".to_string(),
            fallback_award_level: Some("一等奖".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("机器人"));
        assert!(message.contains("二等奖"));
        assert!(message.contains("fallback \"一等奖\""));

        let err = LaurelError::TemplateNotFound {
            category: "机器人".to_string(),
            award_level: "二等奖".to_string(),
            fallback_award_level: None,
        };
        assert!(!err.to_string().contains("fallback"));
    }

    #[test]
    fn io_errors_convert() {
        let err: LaurelError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, LaurelError::Io(_)));
    }
}
