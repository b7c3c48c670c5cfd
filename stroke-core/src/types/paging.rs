use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

pub const DEFAULT_PAGE_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Girder encodes direction as `1` / `-1`.
    pub fn from_sortdir(value: Option<i32>) -> Result<Self, CatalogError> {
        match value {
            None | Some(1) => Ok(Self::Ascending),
            Some(-1) => Ok(Self::Descending),
            Some(other) => Err(CatalogError::Validation(format!(
                "sortdir must be 1 or -1, got {other}"
            ))),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// Apply the window to an already sorted, already filtered sequence.
    pub fn slice<T>(&self, rows: Vec<T>) -> Vec<T> {
        let iter = rows.into_iter().skip(self.offset as usize);
        if self.limit == 0 {
            iter.collect()
        } else {
            iter.take(self.limit as usize).collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort<F> {
    pub field: F,
    pub direction: SortDirection,
}

impl<F> Sort<F> {
    pub const fn ascending(field: F) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StudySortField {
    #[default]
    PatientId,
    Name,
    StudyDate,
    StudyModality,
    NSeries,
    Created,
}

impl StudySortField {
    pub fn column(self) -> &'static str {
        match self {
            StudySortField::PatientId => "patient_id",
            StudySortField::Name => "name",
            StudySortField::StudyDate => "study_date",
            StudySortField::StudyModality => "study_modality",
            StudySortField::NSeries => "n_series",
            StudySortField::Created => "created",
        }
    }
}

impl FromStr for StudySortField {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patientId" => Ok(Self::PatientId),
            "name" | "lowerName" => Ok(Self::Name),
            "studyDate" => Ok(Self::StudyDate),
            "studyModality" => Ok(Self::StudyModality),
            "nSeries" => Ok(Self::NSeries),
            "created" => Ok(Self::Created),
            other => Err(CatalogError::Validation(format!(
                "cannot sort studies by {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeriesSortField {
    #[default]
    Name,
    Created,
}

impl SeriesSortField {
    pub fn column(self) -> &'static str {
        match self {
            SeriesSortField::Name => "name",
            SeriesSortField::Created => "created",
        }
    }
}

impl FromStr for SeriesSortField {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" | "lowerName" => Ok(Self::Name),
            "created" => Ok(Self::Created),
            other => Err(CatalogError::Validation(format!(
                "cannot sort series by {other}"
            ))),
        }
    }
}

/// Build a sort from the raw `sort` / `sortdir` query pair.
pub fn parse_sort<F>(field: Option<&str>, sortdir: Option<i32>) -> Result<Sort<F>, CatalogError>
where
    F: FromStr<Err = CatalogError> + Default,
{
    let field = match field {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse()?,
        _ => F::default(),
    };
    Ok(Sort {
        field,
        direction: SortDirection::from_sortdir(sortdir)?,
    })
}
