use std::collections::{HashMap, HashSet};

use log::warn;

use crate::errors::{Error, Result};
use crate::measure::{DimensionDescriptor, ElementType, Measure};
use crate::source::DimensionInfo;

/// Default, finest granularity code for a dimension
const BASE_CONCEPT_LEVEL: char = 'c';

/// Granularity code reserved for fully aggregated dimensions
const ALL_CONCEPT_LEVEL: char = 'A';

/// User-facing role choices for the dimensions of one measure.
///
/// Either name list may be omitted; an omitted list is derived by exclusion
/// from the other one, keeping source order. When both are omitted the first
/// source dimension becomes implicit and the rest explicit.
///
#[derive(Debug, Clone, Default)]
pub struct RoleSpec {
    pub explicit_names: Option<Vec<String>>,
    pub implicit_names: Option<Vec<String>>,
    pub explicit_concept_levels: Option<Vec<String>>,
    pub implicit_concept_levels: Option<Vec<String>>,
}

/// Assigns each source dimension a role, a level within that role and a
/// concept level, producing the `Measure` the rest of the pipeline works on.
///
pub struct DimensionClassifier<'a> {
    spec: &'a RoleSpec,
}

impl<'a> DimensionClassifier<'a> {
    pub fn new(spec: &'a RoleSpec) -> Self {
        Self { spec }
    }

    pub fn classify(
        &self,
        measure_name: &str,
        element_type: ElementType,
        dimensions: &[DimensionInfo],
    ) -> Result<Measure> {
        if dimensions.is_empty() {
            return Err(Error::InvalidParam(format!(
                "variable {} has no dimensions",
                measure_name
            )));
        }

        let mut seen = HashSet::new();
        for dimension in dimensions {
            if !seen.insert(dimension.name.as_str()) {
                return Err(Error::InvalidParam(format!(
                    "duplicate dimension {}",
                    dimension.name
                )));
            }
            if dimension.length == 0 {
                return Err(Error::InvalidParam(format!(
                    "dimension {} is empty",
                    dimension.name
                )));
            }
        }

        let unlimited = dimensions
            .iter()
            .filter(|dimension| dimension.is_unlimited)
            .count();
        if unlimited > 1 {
            return Err(Error::InvalidParam(String::from(
                "more than one unlimited dimension",
            )));
        }

        let (explicit_names, implicit_names) = self.role_lists(measure_name, dimensions)?;
        let explicit_levels =
            concept_levels(&explicit_names, self.spec.explicit_concept_levels.as_ref())?;
        let implicit_levels =
            concept_levels(&implicit_names, self.spec.implicit_concept_levels.as_ref())?;

        // name -> (explicit, level, concept level)
        let mut roles: HashMap<&str, (bool, usize, char)> = HashMap::new();
        for (index, name) in explicit_names.iter().enumerate() {
            roles.insert(name.as_str(), (true, index + 1, explicit_levels[index]));
        }
        for (index, name) in implicit_names.iter().enumerate() {
            roles.insert(name.as_str(), (false, index + 1, implicit_levels[index]));
        }

        let descriptors = dimensions
            .iter()
            .map(|dimension| {
                let (explicit, level, concept_level) = roles[dimension.name.as_str()];
                DimensionDescriptor {
                    name: dimension.name.clone(),
                    size: dimension.length,
                    element_type: dimension.element_type,
                    explicit,
                    level,
                    concept_level,
                    unlimited: dimension.is_unlimited,
                    start_index: 0,
                    end_index: dimension.length - 1,
                }
            })
            .collect();

        Ok(Measure::new(measure_name, element_type, descriptors))
    }

    /// Resolve the explicit and implicit name lists, in level order
    fn role_lists(
        &self,
        measure_name: &str,
        dimensions: &[DimensionInfo],
    ) -> Result<(Vec<String>, Vec<String>)> {
        match (&self.spec.explicit_names, &self.spec.implicit_names) {
            (Some(explicit), Some(implicit)) => {
                if explicit.len() + implicit.len() != dimensions.len() {
                    return Err(Error::InvalidParam(format!(
                        "{} explicit and {} implicit dimensions given, variable {} has {}",
                        explicit.len(),
                        implicit.len(),
                        measure_name,
                        dimensions.len()
                    )));
                }
                validate_names(explicit, dimensions)?;
                validate_names(implicit, dimensions)?;
                for name in explicit {
                    if implicit.contains(name) {
                        return Err(Error::InvalidParam(format!(
                            "dimension {} classified as both explicit and implicit",
                            name
                        )));
                    }
                }

                Ok((explicit.clone(), implicit.clone()))
            }
            (Some(explicit), None) => {
                validate_names(explicit, dimensions)?;
                let implicit = remainder(dimensions, explicit);

                Ok((explicit.clone(), implicit))
            }
            (None, Some(implicit)) => {
                validate_names(implicit, dimensions)?;
                let explicit = remainder(dimensions, implicit);

                Ok((explicit, implicit.clone()))
            }
            (None, None) => {
                let implicit = vec![dimensions[0].name.clone()];
                let explicit = remainder(dimensions, &implicit);
                warn!(
                    "no dimension roles given for {}, treating {} as implicit",
                    measure_name, dimensions[0].name
                );

                Ok((explicit, implicit))
            }
        }
    }
}

/// Check that every name in `names` is a source dimension and appears once
fn validate_names(names: &[String], dimensions: &[DimensionInfo]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !dimensions.iter().any(|dimension| dimension.name == *name) {
            return Err(Error::InvalidParam(format!(
                "dimension {} not found among source dimensions",
                name
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::InvalidParam(format!(
                "dimension {} listed more than once",
                name
            )));
        }
    }

    Ok(())
}

/// Source dimensions not claimed by `taken`, in source order
fn remainder(dimensions: &[DimensionInfo], taken: &[String]) -> Vec<String> {
    dimensions
        .iter()
        .filter(|dimension| !taken.contains(&dimension.name))
        .map(|dimension| dimension.name.clone())
        .collect()
}

/// Resolve per-dimension concept level codes for one role group
fn concept_levels(names: &[String], inputs: Option<&Vec<String>>) -> Result<Vec<char>> {
    match inputs {
        None => Ok(vec![BASE_CONCEPT_LEVEL; names.len()]),
        Some(inputs) => {
            if inputs.len() != names.len() {
                return Err(Error::InvalidParam(format!(
                    "{} concept levels given for {} dimensions",
                    inputs.len(),
                    names.len()
                )));
            }

            inputs
                .iter()
                .map(|input| parse_concept_level(input))
                .collect()
        }
    }
}

/// Map a concept level string to its single character code.
///
/// "mi..." is minute and "mo..." is month; anything else is taken by its
/// first character. The aggregate code is not a legal granularity for a
/// stored dimension.
///
fn parse_concept_level(input: &str) -> Result<char> {
    let lower = input.to_lowercase();
    let code = if lower.starts_with("mo") {
        'M'
    } else if lower.starts_with("mi") {
        'm'
    } else {
        input
            .chars()
            .next()
            .ok_or_else(|| Error::InvalidParam(String::from("empty concept level")))?
    };

    if code == ALL_CONCEPT_LEVEL {
        return Err(Error::InvalidParam(String::from(
            "aggregate concept level is not valid for a stored dimension",
        )));
    }

    Ok(code)
}
