//! Applicant Segmentation
//!
//! The applicant's self-reported situation. Every field is optional: an
//! incomplete segmentation must never hide a prerequisite, so resolvers treat
//! a missing field as "no constraint".

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of request within a procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcedureSubtype {
    #[serde(rename = "primera-vez")]
    FirstTime,
    #[serde(rename = "renovacion")]
    Renewal,
    #[serde(rename = "perdida", alias = "robo")]
    Lost,
    #[serde(rename = "duplicado")]
    Duplicate,
}

impl ProcedureSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstTime => "primera-vez",
            Self::Renewal => "renovacion",
            Self::Lost => "perdida",
            Self::Duplicate => "duplicado",
        }
    }
}

impl FromStr for ProcedureSubtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primera-vez" => Ok(Self::FirstTime),
            "renovacion" => Ok(Self::Renewal),
            "perdida" | "robo" => Ok(Self::Lost),
            "duplicado" => Ok(Self::Duplicate),
            _ => Err(format!("Unknown procedure subtype: {}", s)),
        }
    }
}

impl std::fmt::Display for ProcedureSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Applicant age bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicantCategory {
    #[serde(rename = "menor-edad")]
    Minor,
    #[serde(rename = "adulto")]
    Adult,
    #[serde(rename = "tercera-edad")]
    Senior,
}

impl ApplicantCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "menor-edad",
            Self::Adult => "adulto",
            Self::Senior => "tercera-edad",
        }
    }
}

impl FromStr for ApplicantCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "menor-edad" => Ok(Self::Minor),
            "adulto" => Ok(Self::Adult),
            "tercera-edad" => Ok(Self::Senior),
            _ => Err(format!("Unknown applicant category: {}", s)),
        }
    }
}

impl std::fmt::Display for ApplicantCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The applicant's situation as answered in the segmentation wizard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segmentation {
    #[serde(default, alias = "nacionalidad", skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, alias = "naturalizado", skip_serializing_if = "Option::is_none")]
    pub naturalized: Option<bool>,
    #[serde(default, alias = "situacionLegal", skip_serializing_if = "Option::is_none")]
    pub legal_status: Option<String>,
    #[serde(default, alias = "tipoTramite", skip_serializing_if = "Option::is_none")]
    pub procedure_subtype: Option<ProcedureSubtype>,
    #[serde(
        default,
        alias = "categoria",
        alias = "category",
        skip_serializing_if = "Option::is_none"
    )]
    pub applicant_category: Option<ApplicantCategory>,
    #[serde(default, alias = "discapacidad", skip_serializing_if = "Option::is_none")]
    pub disability: Option<bool>,
    #[serde(default, alias = "edadAproximada", skip_serializing_if = "Option::is_none")]
    pub approximate_age: Option<u32>,
}

impl Segmentation {
    pub fn with_subtype(mut self, subtype: ProcedureSubtype) -> Self {
        self.procedure_subtype = Some(subtype);
        self
    }

    pub fn with_category(mut self, category: ApplicantCategory) -> Self {
        self.applicant_category = Some(category);
        self
    }

    pub fn with_naturalized(mut self, naturalized: bool) -> Self {
        self.naturalized = Some(naturalized);
        self
    }

    pub fn is_minor(&self) -> bool {
        self.applicant_category == Some(ApplicantCategory::Minor)
    }
}
