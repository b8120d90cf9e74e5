//! Validated field-selection tree.
//!
//! A parsed [`Operation`] is checked against the gateway's graph and turned
//! into typed selections. Every fetch the resolver performs is triggered by
//! one of these nodes, so validation happens up front and a rejected query
//! never reaches an upstream.
//!
//! ```text
//! Query        { mfes: [Mfe], mfe(key: String!): Mfe }
//! Mfe          { key, type, name, dependencies: [Mfe], environments: Environments }
//! Environments { live, staging, test, local: Environment }
//! Environment  { href, builds: [Build] }
//! Build        { name, href*, metadata: Metadata }
//! Metadata     { id, source }
//! ```
//!
//! `Build.href` is only part of the graph when
//! [`EngineOptions::expose_build_href`] is set.

use graphql_parser::query::Type;
use mfe_sources::EnvironmentName;
use serde_json::{Map, Value};

use crate::EngineOptions;
use crate::error::QueryError;
use crate::query::{Field, InputValue, Operation, child_fields, output_name};

/// One selected field and the key it is written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected<F> {
    pub output: String,
    pub field: F,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootField {
    AllApps(Vec<Selected<AppField>>),
    AppByKey {
        key: String,
        selection: Vec<Selected<AppField>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppField {
    Key,
    Type,
    Name,
    /// Dependencies reuse the app selection shape.
    Dependencies(Vec<Selected<AppField>>),
    Environments(Vec<Selected<EnvironmentSlot>>),
}

/// One named environment under `environments`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSlot {
    pub name: EnvironmentName,
    pub selection: Vec<Selected<EnvironmentField>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentField {
    Href,
    Builds(Vec<Selected<BuildField>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildField {
    Name,
    Href,
    Metadata(Vec<Selected<MetadataField>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Id,
    Source,
}

/// Validated selection for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySelection {
    pub roots: Vec<Selected<RootField>>,
}

impl QuerySelection {
    /// Validate `operation` against the graph, substituting variables.
    pub fn from_operation(
        operation: &Operation<'_>,
        variables: &Map<String, Value>,
        options: &EngineOptions,
    ) -> Result<Self, QueryError> {
        let validator = Validator {
            operation,
            variables,
            options,
        };
        let roots = merge("Query", operation.selection.iter())?
            .iter()
            .map(|field| validator.root(field))
            .collect::<Result<_, _>>()?;
        Ok(Self { roots })
    }
}

/// Sibling fields that share an output key, folded into one.
///
/// Occurrences must agree on field name and arguments; their sub-selections
/// are concatenated and merged again one level down.
struct Merged<'f, 'a> {
    field: &'f Field<'a>,
    children: Vec<&'f Field<'a>>,
    /// Some occurrence had no sub-selection.
    bare: bool,
}

fn merge<'f, 'a: 'f>(
    type_name: &'static str,
    fields: impl IntoIterator<Item = &'f Field<'a>>,
) -> Result<Vec<Merged<'f, 'a>>, QueryError> {
    let mut merged: Vec<Merged<'f, 'a>> = Vec::new();
    for field in fields {
        let output = output_name(field);
        let bare = field.selection_set.items.is_empty();
        match merged.iter_mut().find(|m| output_name(m.field) == output) {
            Some(existing) => {
                if existing.field.name != field.name || existing.field.arguments != field.arguments
                {
                    return Err(QueryError::ConflictingFields {
                        type_name,
                        output: output.to_string(),
                    });
                }
                existing.bare |= bare;
                existing.children.extend(child_fields(field));
            }
            None => merged.push(Merged {
                field,
                children: child_fields(field).collect(),
                bare,
            }),
        }
    }
    Ok(merged)
}

struct Validator<'v, 'a> {
    operation: &'v Operation<'a>,
    variables: &'v Map<String, Value>,
    options: &'v EngineOptions,
}

impl Validator<'_, '_> {
    fn root(&self, merged: &Merged<'_, '_>) -> Result<Selected<RootField>, QueryError> {
        const TYPE: &str = "Query";
        let field = merged.field;
        let root = match field.name.as_str() {
            "mfes" => {
                no_arguments(field)?;
                RootField::AllApps(self.app(children(TYPE, merged)?)?)
            }
            "mfe" => {
                let key = self.key_argument(field)?;
                RootField::AppByKey {
                    key,
                    selection: self.app(children(TYPE, merged)?)?,
                }
            }
            _ => return Err(unknown(TYPE, field)),
        };
        Ok(selected(field, root))
    }

    fn key_argument(&self, field: &Field<'_>) -> Result<String, QueryError> {
        let missing = || QueryError::MissingArgument {
            field: field.name.clone(),
            argument: "key",
        };
        let mut key = None;
        for (name, value) in &field.arguments {
            if name != "key" {
                return Err(QueryError::UnknownArgument {
                    field: field.name.clone(),
                    argument: name.clone(),
                });
            }
            key = match value {
                InputValue::String(s) => Some(s.clone()),
                InputValue::Null => None,
                InputValue::Variable(name) => self.variable(name)?,
                _ => {
                    return Err(QueryError::InvalidArgument {
                        field: field.name.clone(),
                        argument: "key",
                    });
                }
            };
        }
        key.ok_or_else(missing)
    }

    fn variable(&self, name: &str) -> Result<Option<String>, QueryError> {
        let invalid = || QueryError::InvalidVariable {
            name: name.to_string(),
        };
        let definition = self
            .operation
            .variables
            .iter()
            .find(|def| def.name == name)
            .ok_or_else(|| QueryError::UndefinedVariable(name.to_string()))?;
        if !is_string_type(&definition.var_type) {
            return Err(invalid());
        }

        let value = match self.variables.get(name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) => None,
            Some(_) => return Err(invalid()),
            None => match &definition.default_value {
                Some(InputValue::String(s)) => Some(s.clone()),
                Some(InputValue::Null) | None => None,
                Some(_) => return Err(invalid()),
            },
        };
        if value.is_none() && matches!(definition.var_type, Type::NonNullType(_)) {
            return Err(QueryError::MissingVariable(name.to_string()));
        }
        Ok(value)
    }

    fn app(&self, fields: &[&Field<'_>]) -> Result<Vec<Selected<AppField>>, QueryError> {
        const TYPE: &str = "Mfe";
        merge(TYPE, fields.iter().copied())?
            .iter()
            .map(|merged| {
                let field = merged.field;
                no_arguments(field)?;
                let app_field = match field.name.as_str() {
                    "key" => scalar(TYPE, merged, AppField::Key)?,
                    "type" => scalar(TYPE, merged, AppField::Type)?,
                    "name" => scalar(TYPE, merged, AppField::Name)?,
                    "dependencies" => AppField::Dependencies(self.app(children(TYPE, merged)?)?),
                    "environments" => {
                        AppField::Environments(self.environments(children(TYPE, merged)?)?)
                    }
                    _ => return Err(unknown(TYPE, field)),
                };
                Ok(selected(field, app_field))
            })
            .collect()
    }

    fn environments(
        &self,
        fields: &[&Field<'_>],
    ) -> Result<Vec<Selected<EnvironmentSlot>>, QueryError> {
        const TYPE: &str = "Environments";
        merge(TYPE, fields.iter().copied())?
            .iter()
            .map(|merged| {
                let field = merged.field;
                no_arguments(field)?;
                let name = EnvironmentName::parse(&field.name).ok_or_else(|| unknown(TYPE, field))?;
                let slot = EnvironmentSlot {
                    name,
                    selection: self.environment(children(TYPE, merged)?)?,
                };
                Ok(selected(field, slot))
            })
            .collect()
    }

    fn environment(
        &self,
        fields: &[&Field<'_>],
    ) -> Result<Vec<Selected<EnvironmentField>>, QueryError> {
        const TYPE: &str = "Environment";
        merge(TYPE, fields.iter().copied())?
            .iter()
            .map(|merged| {
                let field = merged.field;
                no_arguments(field)?;
                let env_field = match field.name.as_str() {
                    "href" => scalar(TYPE, merged, EnvironmentField::Href)?,
                    "builds" => EnvironmentField::Builds(self.build(children(TYPE, merged)?)?),
                    _ => return Err(unknown(TYPE, field)),
                };
                Ok(selected(field, env_field))
            })
            .collect()
    }

    fn build(&self, fields: &[&Field<'_>]) -> Result<Vec<Selected<BuildField>>, QueryError> {
        const TYPE: &str = "Build";
        merge(TYPE, fields.iter().copied())?
            .iter()
            .map(|merged| {
                let field = merged.field;
                no_arguments(field)?;
                let build_field = match field.name.as_str() {
                    "name" => scalar(TYPE, merged, BuildField::Name)?,
                    "href" if self.options.expose_build_href => {
                        scalar(TYPE, merged, BuildField::Href)?
                    }
                    "metadata" => BuildField::Metadata(metadata(children(TYPE, merged)?)?),
                    _ => return Err(unknown(TYPE, field)),
                };
                Ok(selected(field, build_field))
            })
            .collect()
    }
}

fn metadata(fields: &[&Field<'_>]) -> Result<Vec<Selected<MetadataField>>, QueryError> {
    const TYPE: &str = "Metadata";
    merge(TYPE, fields.iter().copied())?
        .iter()
        .map(|merged| {
            let field = merged.field;
            no_arguments(field)?;
            let metadata_field = match field.name.as_str() {
                "id" => scalar(TYPE, merged, MetadataField::Id)?,
                "source" => scalar(TYPE, merged, MetadataField::Source)?,
                _ => return Err(unknown(TYPE, field)),
            };
            Ok(selected(field, metadata_field))
        })
        .collect()
}

/// `String` or `String!`.
fn is_string_type(ty: &Type<'_, String>) -> bool {
    match ty {
        Type::NamedType(name) => name == "String",
        Type::NonNullType(inner) => is_string_type(inner),
        Type::ListType(_) => false,
    }
}

fn selected<F>(field: &Field<'_>, value: F) -> Selected<F> {
    Selected {
        output: output_name(field).to_string(),
        field: value,
    }
}

fn unknown(type_name: &'static str, field: &Field<'_>) -> QueryError {
    QueryError::UnknownField {
        type_name,
        field: field.name.clone(),
    }
}

fn scalar<F>(type_name: &'static str, merged: &Merged<'_, '_>, value: F) -> Result<F, QueryError> {
    if merged.children.is_empty() {
        Ok(value)
    } else {
        Err(QueryError::UnexpectedSelection {
            type_name,
            field: merged.field.name.clone(),
        })
    }
}

fn children<'m, 'f, 'a>(
    type_name: &'static str,
    merged: &'m Merged<'f, 'a>,
) -> Result<&'m [&'f Field<'a>], QueryError> {
    if merged.bare || merged.children.is_empty() {
        Err(QueryError::MissingSelection {
            type_name,
            field: merged.field.name.clone(),
        })
    } else {
        Ok(&merged.children)
    }
}

fn no_arguments(field: &Field<'_>) -> Result<(), QueryError> {
    match field.arguments.first() {
        Some((argument, _)) => Err(QueryError::UnknownArgument {
            field: field.name.clone(),
            argument: argument.clone(),
        }),
        None => Ok(()),
    }
}
