//! The field descriptor table: registration, vector-field convention, and
//! dependency resolution.

use crate::detector::{DerivedFieldFn, FieldDetector};
use crate::field::{Dtype, FieldDescriptor, FieldKind, FieldSourceKind};
use arbor_error::{Error, Result};
use arbor_units::{Unit, UnitArray};
use std::collections::HashMap;

/// A field name is registered at most once across all kinds. Re-registration
/// with `force_add = true` logs a warning and replaces; with `force_add =
/// false` it is a silent no-op (mirrors the source's `add_alias_field`/
/// `add_derived_field` `force_add` contract).
pub struct FieldRegistry {
    fields: HashMap<String, FieldDescriptor>,
    functions: HashMap<String, DerivedFieldFn>,
    /// on-disk field names, in registration order (`arbor.field_list`).
    field_list: Vec<String>,
    /// alias/derived/analysis field names, in registration order
    /// (`arbor.derived_field_list` union `arbor.analysis_field_list`).
    derived_field_list: Vec<String>,
    analysis_field_list: Vec<String>,
    default_dtype: Dtype,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new(Dtype::F64)
    }
}

impl FieldRegistry {
    pub fn new(default_dtype: Dtype) -> Self {
        FieldRegistry {
            fields: HashMap::new(),
            functions: HashMap::new(),
            field_list: Vec::new(),
            derived_field_list: Vec::new(),
            analysis_field_list: Vec::new(),
            default_dtype,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&FieldDescriptor> {
        self.fields.get(name).ok_or_else(|| Error::field_not_found(name))
    }

    pub fn field_list(&self) -> &[String] {
        &self.field_list
    }

    pub fn derived_field_list(&self) -> &[String] {
        &self.derived_field_list
    }

    pub fn analysis_field_list(&self) -> &[String] {
        &self.analysis_field_list
    }

    /// Register a field read straight from a backend's header or column
    /// layout. Called during arbor construction, before any user-facing
    /// registration method runs.
    pub fn register_on_disk(
        &mut self,
        name: impl Into<String>,
        units: Unit,
        source: FieldSourceKind,
    ) -> Result<()> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return Err(Error::field_already_exists(name));
        }
        self.field_list.push(name.clone());
        self.fields
            .insert(name.clone(), FieldDescriptor::on_disk(name, units, source));
        Ok(())
    }

    /// `add_analysis_field(name, units, dtype=default, default=0)`.
    pub fn add_analysis_field(
        &mut self,
        name: impl Into<String>,
        units: Unit,
        dtype: Option<Dtype>,
        default: f64,
        force_add: bool,
    ) -> Result<()> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            if !force_add {
                return Err(Error::field_already_exists(name));
            }
            tracing::warn!(field = %name, "overriding existing field with analysis field");
            self.remove_from_lists(&name);
        }
        self.analysis_field_list.push(name.clone());
        self.fields.insert(
            name.clone(),
            FieldDescriptor {
                name,
                units,
                dtype: dtype.unwrap_or(self.default_dtype),
                kind: FieldKind::Analysis,
                deps: Vec::new(),
                aliases: Vec::new(),
                vector_components: None,
                default,
                description: None,
            },
        );
        Ok(())
    }

    /// `add_alias_field(alias, target, units=None)`.
    pub fn add_alias_field(
        &mut self,
        alias: impl Into<String>,
        target: &str,
        units: Option<Unit>,
        force_add: bool,
    ) -> Result<()> {
        let alias = alias.into();
        if self.fields.contains_key(&alias) {
            if !force_add {
                return Ok(());
            }
            tracing::warn!(field = %alias, "overriding existing field with alias");
            self.remove_from_lists(&alias);
        }

        if !self.fields.contains_key(target) {
            if force_add {
                return Err(Error::field_dependency_not_found(alias, target));
            }
            return Ok(());
        }

        let units = units.unwrap_or_else(|| self.fields[target].units.clone());
        self.derived_field_list.push(alias.clone());
        self.fields.insert(
            alias.clone(),
            FieldDescriptor {
                name: alias.clone(),
                units,
                dtype: self.default_dtype,
                kind: FieldKind::Alias,
                deps: vec![target.to_string()],
                aliases: Vec::new(),
                vector_components: None,
                default: 0.0,
                description: None,
            },
        );
        self.fields.get_mut(target).unwrap().aliases.push(alias);
        Ok(())
    }

    /// `add_derived_field(name, fn, units="", dtype=default, vector=false)`.
    ///
    /// Runs `function` against a `FieldDetector` probed at `probe_size` to
    /// discover dependencies; fails if an unknown field is requested unless
    /// `force_add` is false, in which case it silently refuses.
    pub fn add_derived_field(
        &mut self,
        name: impl Into<String>,
        function: DerivedFieldFn,
        units: Unit,
        dtype: Option<Dtype>,
        vector: bool,
        force_add: bool,
        probe_size: usize,
    ) -> Result<()> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            if !force_add {
                return Ok(());
            }
            tracing::warn!(field = %name, "overriding existing field with derived field");
            self.remove_from_lists(&name);
        }

        let detector = FieldDetector::new(probe_size);
        let deps = detector.discover(&function)?;
        for dep in &deps {
            if !self.fields.contains_key(dep) {
                if force_add {
                    return Err(Error::field_dependency_not_found(name, dep));
                }
                return Ok(());
            }
        }

        self.derived_field_list.push(name.clone());
        self.functions.insert(name.clone(), function);
        self.fields.insert(
            name.clone(),
            FieldDescriptor {
                name,
                units,
                dtype: dtype.unwrap_or(self.default_dtype),
                kind: FieldKind::Derived { vector },
                deps,
                aliases: Vec::new(),
                vector_components: None,
                default: 0.0,
                description: None,
            },
        );
        Ok(())
    }

    pub fn derived_function(&self, name: &str) -> Option<&DerivedFieldFn> {
        self.functions.get(name)
    }

    /// Vector field convention: given x/y/z component fields already
    /// registered, add a derived (N, 3)-equivalent field and a magnitude
    /// field. Returns `None` if the components are not all present.
    pub fn add_vector_field(&mut self, base_name: &str) -> Result<Option<String>> {
        let components = [
            format!("{base_name}_x"),
            format!("{base_name}_y"),
            format!("{base_name}_z"),
        ];
        if !components.iter().all(|c| self.fields.contains_key(c)) {
            return Ok(None);
        }
        let units = self.fields[&components[0]].units.clone();

        for c in &components {
            self.fields.get_mut(c).unwrap().vector_components =
                Some([components[0].clone(), components[1].clone(), components[2].clone()]);
        }

        let vec_name = base_name.to_string();
        self.derived_field_list.push(vec_name.clone());
        self.fields.insert(
            vec_name.clone(),
            FieldDescriptor {
                name: vec_name.clone(),
                units: units.clone(),
                dtype: self.default_dtype,
                kind: FieldKind::Derived { vector: true },
                deps: components.to_vec(),
                aliases: Vec::new(),
                vector_components: Some([components[0].clone(), components[1].clone(), components[2].clone()]),
                default: 0.0,
                description: None,
            },
        );

        let mag_name = format!("{base_name}_magnitude");
        self.derived_field_list.push(mag_name.clone());
        self.fields.insert(
            mag_name.clone(),
            FieldDescriptor {
                name: mag_name,
                units,
                dtype: self.default_dtype,
                kind: FieldKind::Derived { vector: false },
                deps: components.to_vec(),
                aliases: Vec::new(),
                vector_components: None,
                default: 0.0,
                description: None,
            },
        );

        Ok(Some(vec_name))
    }

    /// Split `fields` into read-from-source vs generate, topologically
    /// ordering generated fields by dependency. `cache` holds field names
    /// already materialized at `fsize` elements (or any size if `fsize` is
    /// `None`); those are skipped.
    pub fn resolve_field_dependencies(
        &self,
        fields: &[String],
        cache: &HashMap<String, UnitArray>,
        fsize: Option<usize>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let mut to_read = Vec::new();
        let mut to_generate = Vec::new();
        let mut worklist: Vec<String> = fields.to_vec();

        while let Some(field) = worklist.pop() {
            if let Some(cached) = cache.get(&field) {
                if fsize.is_none() || cached.len() == fsize.unwrap() {
                    continue;
                }
            }

            let descriptor = self.get(&field)?;
            match &descriptor.kind {
                FieldKind::Derived { .. } | FieldKind::Alias => {
                    if descriptor.deps.contains(&field) {
                        return Err(Error::field_circular_dependency(field.clone()));
                    }
                    for dep in &descriptor.deps {
                        if !worklist.contains(dep) {
                            worklist.push(dep.clone());
                        }
                    }
                    if !to_generate.contains(&field) {
                        to_generate.push(field);
                    }
                }
                FieldKind::Analysis | FieldKind::AnalysisSaved => {
                    if !to_generate.contains(&field) {
                        to_generate.push(field);
                    }
                }
                FieldKind::OnDisk { .. } => {
                    if !to_read.contains(&field) {
                        to_read.push(field);
                    }
                }
            }
        }

        Ok((to_read, to_generate))
    }

    fn remove_from_lists(&mut self, name: &str) {
        self.field_list.retain(|f| f != name);
        self.derived_field_list.retain(|f| f != name);
        self.analysis_field_list.retain(|f| f != name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_units::Unit;

    fn registry_with_mass() -> FieldRegistry {
        let mut reg = FieldRegistry::default();
        reg.register_on_disk("Mvir", Unit::parse("Msun/h").unwrap(), FieldSourceKind::File)
            .unwrap();
        reg.add_alias_field("mass", "Mvir", None, true).unwrap();
        reg
    }

    #[test]
    fn alias_inherits_target_units() {
        let reg = registry_with_mass();
        assert_eq!(reg.get("mass").unwrap().units, reg.get("Mvir").unwrap().units);
    }

    #[test]
    fn analysis_field_defaults_and_rejects_duplicate() {
        let mut reg = registry_with_mass();
        reg.add_analysis_field("score", Unit::dimensionless(), None, -1.0, false)
            .unwrap();
        assert_eq!(reg.get("score").unwrap().default, -1.0);
        assert!(reg
            .add_analysis_field("score", Unit::dimensionless(), None, 0.0, false)
            .is_err());
    }

    #[test]
    fn derived_field_discovers_and_validates_dependencies() {
        let mut reg = registry_with_mass();
        reg.register_on_disk("rvir", Unit::parse("kpc").unwrap(), FieldSourceKind::File)
            .unwrap();
        let f: DerivedFieldFn = std::sync::Arc::new(|data: &mut dyn crate::detector::FieldAccess| {
            let mass = data.get("mass")?;
            let rvir = data.get("rvir")?;
            Ok(UnitArray::new(
                mass.values.iter().zip(&rvir.values).map(|(m, r)| m / r).collect(),
                Unit::dimensionless(),
            ))
        });
        reg.add_derived_field("specific", f, Unit::dimensionless(), None, false, true, 4)
            .unwrap();
        let descriptor = reg.get("specific").unwrap();
        assert_eq!(descriptor.deps, vec!["mass".to_string(), "rvir".to_string()]);
    }

    #[test]
    fn derived_field_with_unknown_dependency_errors_when_forced() {
        let mut reg = registry_with_mass();
        let f: DerivedFieldFn = std::sync::Arc::new(|data: &mut dyn crate::detector::FieldAccess| {
            data.get("nonexistent")
        });
        assert!(reg
            .add_derived_field("broken", f, Unit::dimensionless(), None, false, true, 4)
            .is_err());
    }

    #[test]
    fn resolve_field_dependencies_splits_and_orders() {
        let mut reg = registry_with_mass();
        reg.register_on_disk("rvir", Unit::parse("kpc").unwrap(), FieldSourceKind::File)
            .unwrap();
        let f: DerivedFieldFn = std::sync::Arc::new(|data: &mut dyn crate::detector::FieldAccess| {
            let mass = data.get("mass")?;
            let rvir = data.get("rvir")?;
            Ok(UnitArray::new(
                mass.values.iter().zip(&rvir.values).map(|(m, r)| m / r).collect(),
                Unit::dimensionless(),
            ))
        });
        reg.add_derived_field("specific", f, Unit::dimensionless(), None, false, true, 4)
            .unwrap();

        let (to_read, to_generate) = reg
            .resolve_field_dependencies(&["specific".to_string()], &HashMap::new(), None)
            .unwrap();
        assert!(to_read.contains(&"Mvir".to_string()));
        assert!(to_read.contains(&"rvir".to_string()));
        assert_eq!(to_generate, vec!["mass".to_string(), "specific".to_string()]);
    }

    #[test]
    fn circular_dependency_is_rejected() {
        let mut reg = FieldRegistry::default();
        reg.register_on_disk("base", Unit::dimensionless(), FieldSourceKind::File)
            .unwrap();
        // Manually construct a self-referential descriptor to simulate a cycle,
        // bypassing add_derived_field's own detector (which cannot self-reference
        // a field that doesn't exist yet).
        reg.fields.insert(
            "cyclic".to_string(),
            FieldDescriptor {
                name: "cyclic".to_string(),
                units: Unit::dimensionless(),
                dtype: Dtype::F64,
                kind: FieldKind::Derived { vector: false },
                deps: vec!["cyclic".to_string()],
                aliases: Vec::new(),
                vector_components: None,
                default: 0.0,
                description: None,
            },
        );
        let result = reg.resolve_field_dependencies(&["cyclic".to_string()], &HashMap::new(), None);
        assert!(result.is_err());
    }
}
