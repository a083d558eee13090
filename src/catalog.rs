// src/catalog.rs - Object types, pipeline objects, tag templates and tags
//
// The catalog is the in-memory reference implementation of `TagRepository`.
// Besides plain CRUD it owns the template instantiation rule: every pipeline
// object gets one tag per template of its object type, with `{index}` in the
// template strings replaced by the object's index.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{Result, ScadaError};
use crate::model::{
    AlarmDefinition, Condition, DefinitionId, ObjectTypeId, PipelineObjectId, Severity, Tag,
    TagId, TemplateId,
};
use crate::storage::TagRepository;
use crate::value::DataType;

// ============================================================================
// ENTITIES
// ============================================================================

/// Kind of installation, e.g. `pump_station` or `valve`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectType {
    pub id: ObjectTypeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A physical installation along the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineObject {
    pub id: PipelineObjectId,
    pub object_type: ObjectTypeId,
    pub name: String,
    /// Index within the object type (e.g. `001`), substituted verbatim for `{index}`
    pub index: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    /// Kilometre mark along the line
    #[serde(default)]
    pub km_mark: Option<f64>,
}

/// Per-object-type pattern from which concrete tags are instantiated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagTemplate {
    pub id: TemplateId,
    pub object_type: ObjectTypeId,
    /// Tag name pattern, e.g. `PRESSURE_IN_{index}`
    pub name_template: String,
    #[serde(default)]
    pub description_template: String,
    pub data_type: DataType,
    #[serde(default)]
    pub engineering_units: String,
    pub min_value: f64,
    pub max_value: f64,
}

impl TagTemplate {
    /// Tag name for the object with the given index
    pub fn render_name(&self, index: &str) -> String {
        self.name_template.replace("{index}", index)
    }

    /// Tag description for the object with the given index
    pub fn render_description(&self, index: &str) -> String {
        self.description_template.replace("{index}", index)
    }
}

// ============================================================================
// INSERT RECORDS
// ============================================================================

/// Fields of a pipeline object before an id is assigned
#[derive(Debug, Clone, Default)]
pub struct NewPipelineObject {
    pub object_type: ObjectTypeId,
    pub name: String,
    pub index: String,
    pub description: String,
    pub location: String,
    pub km_mark: Option<f64>,
}

/// Fields of a tag template before an id is assigned
#[derive(Debug, Clone)]
pub struct NewTagTemplate {
    pub object_type: ObjectTypeId,
    pub name_template: String,
    pub description_template: String,
    pub data_type: DataType,
    pub engineering_units: String,
    pub min_value: f64,
    pub max_value: f64,
}

impl Default for NewTagTemplate {
    fn default() -> Self {
        Self {
            object_type: 0,
            name_template: String::new(),
            description_template: String::new(),
            data_type: DataType::Float,
            engineering_units: String::new(),
            min_value: 0.0,
            max_value: 100.0,
        }
    }
}

/// Fields of a hand-made tag (one not backed by a template)
#[derive(Debug, Clone)]
pub struct NewTag {
    pub name: String,
    pub description: String,
    pub data_type: DataType,
    pub engineering_units: String,
    pub min_value: f64,
    pub max_value: f64,
    pub pipeline_object: PipelineObjectId,
}

impl Default for NewTag {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            data_type: DataType::Float,
            engineering_units: String::new(),
            min_value: 0.0,
            max_value: 100.0,
            pipeline_object: 0,
        }
    }
}

/// Fields of an alarm definition before an id is assigned
#[derive(Debug, Clone)]
pub struct NewAlarmDefinition {
    pub tag_id: TagId,
    pub name: String,
    pub condition: Condition,
    pub trigger_value: f64,
    pub message: String,
    pub severity: Severity,
    pub enabled: bool,
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Default)]
struct CatalogData {
    object_types: BTreeMap<ObjectTypeId, ObjectType>,
    objects: BTreeMap<PipelineObjectId, PipelineObject>,
    templates: BTreeMap<TemplateId, TagTemplate>,
    tags: BTreeMap<TagId, Tag>,
    definitions: BTreeMap<DefinitionId, AlarmDefinition>,
    last_id: u64,
}

impl CatalogData {
    fn allocate(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn tag_mut(&mut self, id: TagId) -> Result<&mut Tag> {
        self.tags
            .get_mut(&id)
            .ok_or_else(|| ScadaError::not_found("tag", id))
    }

    fn ensure_unique_tag_name(&self, name: &str) -> Result<()> {
        if self.tags.values().any(|t| t.name == name) {
            return Err(ScadaError::Config(format!("tag name '{}' already in use", name)));
        }
        Ok(())
    }

    fn instantiated(&self, template: TemplateId, object: PipelineObjectId) -> Option<&Tag> {
        self.tags
            .values()
            .find(|t| t.template == Some(template) && t.pipeline_object == object)
    }

    fn instantiate(&mut self, template_id: TemplateId, object_id: PipelineObjectId) -> Result<Tag> {
        let template = self
            .templates
            .get(&template_id)
            .ok_or_else(|| ScadaError::not_found("tag template", template_id))?
            .clone();
        let object = self
            .objects
            .get(&object_id)
            .ok_or_else(|| ScadaError::not_found("pipeline object", object_id))?
            .clone();

        if template.object_type != object.object_type {
            return Err(ScadaError::Config(format!(
                "template '{}' belongs to object type {}, object '{}' is of type {}",
                template.name_template, template.object_type, object.name, object.object_type
            )));
        }

        let name = template.render_name(&object.index);
        self.ensure_unique_tag_name(&name)?;

        let tag = Tag {
            id: self.allocate(),
            name,
            description: template.render_description(&object.index),
            data_type: template.data_type,
            engineering_units: template.engineering_units.clone(),
            min_value: template.min_value,
            max_value: template.max_value,
            archived: false,
            pipeline_object: object.id,
            template: Some(template.id),
        };
        debug!("Instantiated tag '{}' from template {}", tag.name, template.id);
        self.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }
}

fn validate_range(min_value: f64, max_value: f64) -> Result<()> {
    if !min_value.is_finite() || !max_value.is_finite() || min_value > max_value {
        return Err(ScadaError::Config(format!(
            "invalid range [{}, {}]",
            min_value, max_value
        )));
    }
    Ok(())
}

/// In-memory catalog of the pipeline data model
///
/// Ids are allocated from a single sequence shared by every entity kind.
///
/// # Examples
///
/// ```rust
/// use pipeline_scada::catalog::{Catalog, NewPipelineObject, NewTagTemplate};
///
/// let catalog = Catalog::new();
/// let station = catalog.add_object_type("pump_station", "Pump station").unwrap();
/// catalog.add_template(NewTagTemplate {
///     object_type: station.id,
///     name_template: "PRESSURE_IN_{index}".into(),
///     engineering_units: "MPa".into(),
///     ..Default::default()
/// }).unwrap();
/// catalog.add_pipeline_object(NewPipelineObject {
///     object_type: station.id,
///     name: "PS-1".into(),
///     index: "001".into(),
///     ..Default::default()
/// }).unwrap();
///
/// let created = catalog.materialize_tags().unwrap();
/// assert_eq!(created[0].name, "PRESSURE_IN_001");
/// assert!(catalog.materialize_tags().unwrap().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Catalog {
    data: RwLock<CatalogData>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Inserts
    // ------------------------------------------------------------------------

    pub fn add_object_type(&self, name: &str, description: &str) -> Result<ObjectType> {
        let mut data = self.data.write();
        if data.object_types.values().any(|t| t.name == name) {
            return Err(ScadaError::Config(format!(
                "object type '{}' already exists",
                name
            )));
        }
        let object_type = ObjectType {
            id: data.allocate(),
            name: name.to_string(),
            description: description.to_string(),
        };
        data.object_types.insert(object_type.id, object_type.clone());
        Ok(object_type)
    }

    pub fn add_pipeline_object(&self, new: NewPipelineObject) -> Result<PipelineObject> {
        let mut data = self.data.write();
        if !data.object_types.contains_key(&new.object_type) {
            return Err(ScadaError::not_found("object type", new.object_type));
        }
        if data
            .objects
            .values()
            .any(|o| o.object_type == new.object_type && o.index == new.index)
        {
            return Err(ScadaError::Config(format!(
                "object type {} already has an object with index '{}'",
                new.object_type, new.index
            )));
        }
        let object = PipelineObject {
            id: data.allocate(),
            object_type: new.object_type,
            name: new.name,
            index: new.index,
            description: new.description,
            location: new.location,
            km_mark: new.km_mark,
        };
        data.objects.insert(object.id, object.clone());
        Ok(object)
    }

    pub fn add_template(&self, new: NewTagTemplate) -> Result<TagTemplate> {
        validate_range(new.min_value, new.max_value)?;
        let mut data = self.data.write();
        if !data.object_types.contains_key(&new.object_type) {
            return Err(ScadaError::not_found("object type", new.object_type));
        }
        if data
            .templates
            .values()
            .any(|t| t.object_type == new.object_type && t.name_template == new.name_template)
        {
            return Err(ScadaError::Config(format!(
                "template '{}' already exists for object type {}",
                new.name_template, new.object_type
            )));
        }
        let template = TagTemplate {
            id: data.allocate(),
            object_type: new.object_type,
            name_template: new.name_template,
            description_template: new.description_template,
            data_type: new.data_type,
            engineering_units: new.engineering_units,
            min_value: new.min_value,
            max_value: new.max_value,
        };
        data.templates.insert(template.id, template.clone());
        Ok(template)
    }

    pub fn add_tag(&self, new: NewTag) -> Result<Tag> {
        validate_range(new.min_value, new.max_value)?;
        let mut data = self.data.write();
        if !data.objects.contains_key(&new.pipeline_object) {
            return Err(ScadaError::not_found("pipeline object", new.pipeline_object));
        }
        data.ensure_unique_tag_name(&new.name)?;
        let tag = Tag {
            id: data.allocate(),
            name: new.name,
            description: new.description,
            data_type: new.data_type,
            engineering_units: new.engineering_units,
            min_value: new.min_value,
            max_value: new.max_value,
            archived: false,
            pipeline_object: new.pipeline_object,
            template: None,
        };
        data.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    pub fn add_definition(&self, new: NewAlarmDefinition) -> Result<AlarmDefinition> {
        let mut data = self.data.write();
        if !data.tags.contains_key(&new.tag_id) {
            return Err(ScadaError::not_found("tag", new.tag_id));
        }
        let definition = AlarmDefinition {
            id: data.allocate(),
            tag_id: new.tag_id,
            name: new.name,
            condition: new.condition,
            trigger_value: new.trigger_value,
            message: new.message,
            severity: new.severity,
            enabled: new.enabled,
        };
        info!(
            "Registered alarm definition '{}' ({} {}) on tag {}",
            definition.name, definition.condition, definition.trigger_value, definition.tag_id
        );
        data.definitions.insert(definition.id, definition.clone());
        Ok(definition)
    }

    // ------------------------------------------------------------------------
    // Template instantiation
    // ------------------------------------------------------------------------

    /// Tag for a (template, object) pair, created on first use
    pub fn instantiate_tag(
        &self,
        template_id: TemplateId,
        object_id: PipelineObjectId,
    ) -> Result<Tag> {
        let mut data = self.data.write();
        if let Some(existing) = data.instantiated(template_id, object_id) {
            return Ok(existing.clone());
        }
        data.instantiate(template_id, object_id)
    }

    /// Instantiate every template for every object of its type
    ///
    /// Existing (template, object) pairs are left untouched; only the newly
    /// created tags are returned.
    pub fn materialize_tags(&self) -> Result<Vec<Tag>> {
        let mut data = self.data.write();
        let pairs: Vec<(TemplateId, PipelineObjectId)> = data
            .objects
            .values()
            .flat_map(|object| {
                data.templates
                    .values()
                    .filter(move |t| t.object_type == object.object_type)
                    .map(move |t| (t.id, object.id))
            })
            .collect();

        let mut created = Vec::new();
        for (template_id, object_id) in pairs {
            if data.instantiated(template_id, object_id).is_none() {
                created.push(data.instantiate(template_id, object_id)?);
            }
        }
        if !created.is_empty() {
            info!("Materialized {} tags from templates", created.len());
        }
        Ok(created)
    }

    // ------------------------------------------------------------------------
    // Configuration edits
    // ------------------------------------------------------------------------

    pub fn update_tag_range(&self, tag_id: TagId, min_value: f64, max_value: f64) -> Result<Tag> {
        validate_range(min_value, max_value)?;
        let mut data = self.data.write();
        let tag = data.tag_mut(tag_id)?;
        tag.min_value = min_value;
        tag.max_value = max_value;
        Ok(tag.clone())
    }

    pub fn set_tag_units(&self, tag_id: TagId, units: &str) -> Result<Tag> {
        let mut data = self.data.write();
        let tag = data.tag_mut(tag_id)?;
        tag.engineering_units = units.to_string();
        Ok(tag.clone())
    }

    /// Hide a tag from listings; values are still accepted
    pub fn archive_tag(&self, tag_id: TagId) -> Result<Tag> {
        let mut data = self.data.write();
        let tag = data.tag_mut(tag_id)?;
        tag.archived = true;
        info!("Archived tag '{}'", tag.name);
        Ok(tag.clone())
    }

    pub fn set_definition_enabled(
        &self,
        definition_id: DefinitionId,
        enabled: bool,
    ) -> Result<AlarmDefinition> {
        let mut data = self.data.write();
        let definition = data
            .definitions
            .get_mut(&definition_id)
            .ok_or_else(|| ScadaError::not_found("alarm definition", definition_id))?;
        definition.enabled = enabled;
        Ok(definition.clone())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Non-archived tags ordered by name
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .data
            .read()
            .tags
            .values()
            .filter(|t| !t.archived)
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    pub fn tags_for_object(&self, object_id: PipelineObjectId) -> Vec<Tag> {
        self.data
            .read()
            .tags
            .values()
            .filter(|t| t.pipeline_object == object_id)
            .cloned()
            .collect()
    }

    pub fn tag_by_name(&self, name: &str) -> Result<Tag> {
        self.data
            .read()
            .tags
            .values()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| ScadaError::NotFound(format!("tag '{}'", name)))
    }

    pub fn object_type_by_name(&self, name: &str) -> Result<ObjectType> {
        self.data
            .read()
            .object_types
            .values()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| ScadaError::NotFound(format!("object type '{}'", name)))
    }

    pub fn pipeline_object_by_name(&self, name: &str) -> Result<PipelineObject> {
        self.data
            .read()
            .objects
            .values()
            .find(|o| o.name == name)
            .cloned()
            .ok_or_else(|| ScadaError::NotFound(format!("pipeline object '{}'", name)))
    }

    /// All alarm definitions ordered by id
    pub fn definitions(&self) -> Vec<AlarmDefinition> {
        self.data.read().definitions.values().cloned().collect()
    }

    pub fn pipeline_objects(&self) -> Vec<PipelineObject> {
        self.data.read().objects.values().cloned().collect()
    }

    pub fn templates(&self) -> Vec<TagTemplate> {
        self.data.read().templates.values().cloned().collect()
    }
}

impl TagRepository for Catalog {
    fn tag(&self, id: TagId) -> Result<Tag> {
        self.data
            .read()
            .tags
            .get(&id)
            .cloned()
            .ok_or_else(|| ScadaError::not_found("tag", id))
    }

    fn enabled_definitions(&self, tag_id: TagId) -> Result<Vec<AlarmDefinition>> {
        Ok(self
            .data
            .read()
            .definitions
            .values()
            .filter(|d| d.tag_id == tag_id && d.enabled)
            .cloned()
            .collect())
    }

    fn definition(&self, id: DefinitionId) -> Result<AlarmDefinition> {
        self.data
            .read()
            .definitions
            .get(&id)
            .cloned()
            .ok_or_else(|| ScadaError::not_found("alarm definition", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station_catalog() -> (Catalog, ObjectType) {
        let catalog = Catalog::new();
        let station = catalog.add_object_type("pump_station", "Pump station").unwrap();
        catalog
            .add_template(NewTagTemplate {
                object_type: station.id,
                name_template: "PRESSURE_IN_{index}".into(),
                description_template: "Inlet pressure, station {index}".into(),
                engineering_units: "MPa".into(),
                max_value: 10.0,
                ..Default::default()
            })
            .unwrap();
        catalog
            .add_template(NewTagTemplate {
                object_type: station.id,
                name_template: "PUMP_RUNNING_{index}".into(),
                data_type: DataType::Boolean,
                max_value: 1.0,
                ..Default::default()
            })
            .unwrap();
        (catalog, station)
    }

    fn add_station(catalog: &Catalog, station: &ObjectType, index: u32) -> PipelineObject {
        catalog
            .add_pipeline_object(NewPipelineObject {
                object_type: station.id,
                name: format!("PS-{}", index),
                index: index.to_string(),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_instantiation_substitutes_index() {
        let (catalog, station) = station_catalog();
        let object = add_station(&catalog, &station, 3);
        let template = catalog.templates()[0].clone();

        let tag = catalog.instantiate_tag(template.id, object.id).unwrap();
        assert_eq!(tag.name, "PRESSURE_IN_3");
        assert_eq!(tag.description, "Inlet pressure, station 3");
        assert_eq!(tag.engineering_units, "MPa");
        assert_eq!(tag.max_value, 10.0);
        assert_eq!(tag.template, Some(template.id));

        // Second call returns the same tag
        let again = catalog.instantiate_tag(template.id, object.id).unwrap();
        assert_eq!(again.id, tag.id);
    }

    #[test]
    fn test_index_substituted_verbatim() {
        let (catalog, station) = station_catalog();
        let padded = catalog
            .add_pipeline_object(NewPipelineObject {
                object_type: station.id,
                name: "PS-001".into(),
                index: "001".into(),
                ..Default::default()
            })
            .unwrap();
        catalog.materialize_tags().unwrap();

        let tag = catalog.tag_by_name("PRESSURE_IN_001").unwrap();
        assert_eq!(tag.pipeline_object, padded.id);
        assert_eq!(tag.description, "Inlet pressure, station 001");

        // "1" and "001" are distinct indices
        add_station(&catalog, &station, 1);
        catalog.materialize_tags().unwrap();
        assert!(catalog.tag_by_name("PRESSURE_IN_1").is_ok());
        assert!(catalog
            .add_pipeline_object(NewPipelineObject {
                object_type: station.id,
                name: "PS-001-bis".into(),
                index: "001".into(),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let (catalog, station) = station_catalog();
        let first = add_station(&catalog, &station, 1);
        add_station(&catalog, &station, 2);

        assert_eq!(catalog.materialize_tags().unwrap().len(), 4);
        assert!(catalog.materialize_tags().unwrap().is_empty());
        assert_eq!(catalog.tags_for_object(first.id).len(), 2);

        add_station(&catalog, &station, 3);
        let created = catalog.materialize_tags().unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|t| t.name.ends_with("_3")));
    }

    #[test]
    fn test_template_object_type_must_match() {
        let (catalog, _station) = station_catalog();
        let valve = catalog.add_object_type("valve", "").unwrap();
        let object = add_station(&catalog, &valve, 1);
        let template = catalog.templates()[0].clone();

        let err = catalog.instantiate_tag(template.id, object.id).unwrap_err();
        assert!(matches!(err, ScadaError::Config(_)));
    }

    #[test]
    fn test_uniqueness_rules() {
        let (catalog, station) = station_catalog();
        add_station(&catalog, &station, 1);

        assert!(catalog.add_object_type("pump_station", "").is_err());
        assert!(catalog
            .add_pipeline_object(NewPipelineObject {
                object_type: station.id,
                name: "duplicate".into(),
                index: "1".into(),
                ..Default::default()
            })
            .is_err());
        assert!(catalog
            .add_template(NewTagTemplate {
                object_type: station.id,
                name_template: "PRESSURE_IN_{index}".into(),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn test_enabled_definitions_ordered_and_filtered() {
        let (catalog, station) = station_catalog();
        add_station(&catalog, &station, 1);
        catalog.materialize_tags().unwrap();
        let tag = catalog.tag_by_name("PRESSURE_IN_1").unwrap();

        let mk = |name: &str, enabled| NewAlarmDefinition {
            tag_id: tag.id,
            name: name.into(),
            condition: Condition::GreaterThan,
            trigger_value: 8.0,
            message: String::new(),
            severity: Severity::High,
            enabled,
        };
        let a = catalog.add_definition(mk("a", true)).unwrap();
        let b = catalog.add_definition(mk("b", false)).unwrap();
        let c = catalog.add_definition(mk("c", true)).unwrap();

        let ids: Vec<_> = catalog
            .enabled_definitions(tag.id)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id]);

        catalog.set_definition_enabled(b.id, true).unwrap();
        assert_eq!(catalog.enabled_definitions(tag.id).unwrap().len(), 3);
    }

    #[test]
    fn test_archive_hides_tag_from_listing() {
        let (catalog, station) = station_catalog();
        add_station(&catalog, &station, 1);
        catalog.materialize_tags().unwrap();
        let tag = catalog.tag_by_name("PUMP_RUNNING_1").unwrap();

        catalog.archive_tag(tag.id).unwrap();
        assert_eq!(catalog.tags().len(), 1);
        // Still resolvable for ingestion
        assert!(catalog.tag(tag.id).unwrap().archived);
    }

    #[test]
    fn test_range_edit_validation() {
        let (catalog, station) = station_catalog();
        add_station(&catalog, &station, 1);
        catalog.materialize_tags().unwrap();
        let tag = catalog.tag_by_name("PRESSURE_IN_1").unwrap();

        assert!(catalog.update_tag_range(tag.id, 5.0, 1.0).is_err());
        let updated = catalog.update_tag_range(tag.id, 0.0, 12.0).unwrap();
        assert_eq!(updated.max_value, 12.0);
        assert!(matches!(
            catalog.set_tag_units(999, "bar"),
            Err(ScadaError::NotFound(_))
        ));
    }
}
