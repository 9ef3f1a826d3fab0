use std::fmt::Display;

/// Joint entity and relation extraction via table filling
pub mod table_filling;

/// Available Pipelines
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Pipeline {
    /// Table Filling
    TableFilling,
}

impl TryFrom<&str> for Pipeline {
    type Error = PipelineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value == table_filling::PIPELINE {
            Ok(Pipeline::TableFilling)
        } else {
            Err(PipelineError::Unknown(value.to_string()))
        }
    }
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Pipeline::TableFilling => table_filling::PIPELINE,
        };

        write!(f, "{}", name)
    }
}

/// Pipeline Error
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// No pipeline found for the given string
    #[error("no pipeline found for {0}")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pipeline_round_trips_through_its_token() {
        let pipeline = Pipeline::try_from("table-filling").unwrap();

        assert_eq!(pipeline, Pipeline::TableFilling);
        assert_eq!(pipeline.to_string(), "table-filling");
    }

    #[test]
    fn unknown_pipeline_is_rejected() {
        assert!(Pipeline::try_from("text-classification").is_err());
    }
}
