//! Argument schema for the external tool.
//!
//! The job manager itself never validates arguments. This schema is used by
//! the request layer to turn `name=value` pairs into command-line tokens
//! before a job is submitted.

use crate::error::{Error, Result};
use crate::types::Args;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    Int,
    Boolean,
    Float,
    String,
    Flag,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentSpec {
    /// A missing type is treated as a flag.
    #[serde(rename = "type", default)]
    pub arg_type: Option<ArgType>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentSchema {
    specs: BTreeMap<String, ArgumentSpec>,
}

impl ArgumentSchema {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| Error::config(format!("cannot read {}: {}", path.display(), err)))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| Error::config(err.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentSpec> {
        self.specs.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn validate(&self, name: &str, value: &str) -> Result<()> {
        let invalid = || Error::InvalidArgument {
            name: name.to_string(),
            value: value.to_string(),
        };
        let spec = self.get(name).ok_or_else(invalid)?;
        let numeric = match spec.arg_type.unwrap_or(ArgType::Flag) {
            ArgType::Flag => return Ok(()),
            ArgType::Boolean => {
                return if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
                {
                    Ok(())
                } else {
                    Err(invalid())
                };
            }
            ArgType::String => {
                return if spec
                    .allowed_values
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(value))
                {
                    Ok(())
                } else {
                    Err(invalid())
                };
            }
            ArgType::Int => value.parse::<i64>().map_err(|_| invalid())? as f64,
            ArgType::Float => value.parse::<f64>().map_err(|_| invalid())?,
        };
        let below = spec.min.map_or(false, |min| numeric < min);
        let above = spec.max.map_or(false, |max| numeric > max);
        if below || above || numeric.is_nan() {
            return Err(invalid());
        }
        Ok(())
    }

    /// Validate `name=value` pairs and expand them into tool arguments, in order.
    pub fn tokens<'a, I>(&self, pairs: I) -> Result<Args>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut args = Args::new();
        for (name, value) in pairs {
            self.validate(name, value)?;
            let spec = &self.specs[name];
            args.push(format!("{}{}", spec.prefix, name));
            if !value.is_empty() {
                args.push(value.to_string());
            }
        }
        Ok(args)
    }
}
