//! Entity definitions.
//!
//! An [`EntityDef`] is the declared schema of one entity type: its name, its
//! typed fields and its association descriptors. Definitions are assembled
//! with [`EntityDefBuilder`], which fails fast on duplicate declarations —
//! a wiring mistake should surface where the schema is written, not at query
//! time.

use crate::association::{Association, AssociationKind, AssociationOptions};
use crate::error::{Error, Result};
use crate::field::{FieldDef, FieldType};

/// The declared schema of an entity type.
#[derive(Debug, Clone)]
pub struct EntityDef {
    name: String,
    fields: Vec<FieldDef>,
    associations: Vec<Association>,
}

impl EntityDef {
    /// Start building a definition for the entity type `name`.
    pub fn new(name: impl Into<String>) -> EntityDefBuilder {
        EntityDefBuilder {
            name: name.into(),
            fields: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// The entity type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether a field with this name is declared.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Declared associations in declaration order.
    #[must_use]
    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    /// Look up a declared association by shortname.
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.name() == name)
    }

    /// Whether an association with this shortname is declared.
    #[must_use]
    pub fn has_association(&self, name: &str) -> bool {
        self.association(name).is_some()
    }
}

/// Builder for [`EntityDef`].
#[derive(Debug)]
pub struct EntityDefBuilder {
    name: String,
    fields: Vec<FieldDef>,
    associations: Vec<(AssociationKind, String, String, AssociationOptions)>,
}

impl EntityDefBuilder {
    /// Declare a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef::new(name, field_type));
        self
    }

    /// Declare a belongs-to association: the foreign key lives on this entity.
    #[must_use]
    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        options: AssociationOptions,
    ) -> Self {
        self.association(AssociationKind::BelongsTo, name, target, options)
    }

    /// Declare a has-one association: a single target row points back here.
    #[must_use]
    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        options: AssociationOptions,
    ) -> Self {
        self.association(AssociationKind::HasOne, name, target, options)
    }

    /// Declare a has-many association: many target rows point back here.
    #[must_use]
    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        options: AssociationOptions,
    ) -> Self {
        self.association(AssociationKind::HasMany, name, target, options)
    }

    /// Declare a many-to-many association through a lookup table.
    #[must_use]
    pub fn has_and_belongs_to_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        options: AssociationOptions,
    ) -> Self {
        self.association(AssociationKind::HasAndBelongsToMany, name, target, options)
    }

    fn association(
        mut self,
        kind: AssociationKind,
        name: impl Into<String>,
        target: impl Into<String>,
        options: AssociationOptions,
    ) -> Self {
        self.associations
            .push((kind, name.into(), target.into(), options));
        self
    }

    /// Validate and assemble the definition.
    ///
    /// Fails with a configuration error on duplicate field names, duplicate
    /// association shortnames, or an association shadowing a field.
    pub fn build(self) -> Result<EntityDef> {
        let mut fields: Vec<FieldDef> = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            if fields.iter().any(|f| f.name == field.name) {
                return Err(Error::DuplicateField {
                    entity: self.name,
                    field: field.name,
                });
            }
            fields.push(field);
        }

        let mut associations: Vec<Association> = Vec::with_capacity(self.associations.len());
        for (kind, name, target, options) in self.associations {
            let clash = associations.iter().any(|a| a.name() == name)
                || fields.iter().any(|f| f.name == name);
            if clash {
                return Err(Error::DuplicateAssociation {
                    entity: self.name,
                    association: name,
                });
            }
            associations.push(Association::new(kind, name, target, self.name.as_str(), options));
        }

        Ok(EntityDef {
            name: self.name,
            fields,
            associations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_lookup() {
        let def = EntityDef::new("User")
            .field("userID", FieldType::Integer)
            .field("name", FieldType::Text)
            .has_many(
                "addresses",
                "Address",
                AssociationOptions::new().foreign_key("userID"),
            )
            .build()
            .unwrap();

        assert_eq!(def.name(), "User");
        assert_eq!(def.fields().len(), 2);
        assert!(def.has_field("name"));
        assert!(!def.has_field("addresses"));

        let assoc = def.association("addresses").unwrap();
        assert_eq!(assoc.kind(), AssociationKind::HasMany);
        assert_eq!(assoc.target(), "Address");
        assert_eq!(assoc.owner(), "User");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = EntityDef::new("User")
            .field("name", FieldType::Text)
            .field("name", FieldType::Text)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateField { .. }));
    }

    #[test]
    fn test_duplicate_association_rejected() {
        let err = EntityDef::new("User")
            .has_one("profile", "Profile", AssociationOptions::new())
            .has_one("profile", "Profile", AssociationOptions::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAssociation { .. }));
    }

    #[test]
    fn test_association_shadowing_field_rejected() {
        let err = EntityDef::new("User")
            .field("profile", FieldType::Text)
            .has_one("profile", "Profile", AssociationOptions::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAssociation { .. }));
    }
}
