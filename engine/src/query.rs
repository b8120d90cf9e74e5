//! Query document parsing.
//!
//! Documents are parsed with `graphql-parser` and narrowed to what the
//! gateway serves: `query` operations, named or shorthand, built from plain
//! fields. Fragments, directives, mutations and subscriptions are rejected
//! here so validation only ever sees fields.

use graphql_parser::query as ast;

use crate::error::QueryError;

pub type Field<'a> = ast::Field<'a, String>;
pub type InputValue<'a> = ast::Value<'a, String>;
pub type VariableDefinition<'a> = ast::VariableDefinition<'a, String>;

/// Parsed, not yet validated, query document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<'a> {
    pub operations: Vec<Operation<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation<'a> {
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition<'a>>,
    pub selection: Vec<Field<'a>>,
}

impl<'a> Document<'a> {
    pub fn parse(source: &'a str) -> Result<Self, QueryError> {
        let document = ast::parse_query::<String>(source)
            .map_err(|err| QueryError::Syntax(err.to_string()))?;

        let mut operations = Vec::with_capacity(document.definitions.len());
        for definition in document.definitions {
            let operation = match definition {
                ast::Definition::Fragment(fragment) => {
                    return Err(QueryError::Unsupported(format!(
                        "fragment `{}`",
                        fragment.name
                    )));
                }
                ast::Definition::Operation(ast::OperationDefinition::SelectionSet(set)) => {
                    Operation {
                        name: None,
                        variables: Vec::new(),
                        selection: plain_fields(set)?,
                    }
                }
                ast::Definition::Operation(ast::OperationDefinition::Query(query)) => {
                    if let Some(directive) = query.directives.first() {
                        return Err(directive_error(directive));
                    }
                    Operation {
                        name: query.name,
                        variables: query.variable_definitions,
                        selection: plain_fields(query.selection_set)?,
                    }
                }
                ast::Definition::Operation(ast::OperationDefinition::Mutation(_)) => {
                    return Err(QueryError::Unsupported("mutation".into()));
                }
                ast::Definition::Operation(ast::OperationDefinition::Subscription(_)) => {
                    return Err(QueryError::Unsupported("subscription".into()));
                }
            };
            operations.push(operation);
        }
        Ok(Self { operations })
    }

    /// Pick the operation to run.
    pub fn operation(&self, name: Option<&str>) -> Result<&Operation<'a>, QueryError> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| QueryError::UnknownOperation(name.to_string())),
            None => match self.operations.as_slice() {
                [only] => Ok(only),
                _ => Err(QueryError::AmbiguousOperation),
            },
        }
    }
}

/// Key a field occupies in the result object.
pub fn output_name<'f>(field: &'f Field<'_>) -> &'f str {
    field.alias.as_deref().unwrap_or(&field.name)
}

/// Direct child fields of `field`. Only meaningful on documents that went
/// through [`Document::parse`], which has already rejected fragments.
pub fn child_fields<'f, 'a>(field: &'f Field<'a>) -> impl Iterator<Item = &'f Field<'a>> {
    field.selection_set.items.iter().filter_map(|item| match item {
        ast::Selection::Field(child) => Some(child),
        ast::Selection::FragmentSpread(_) | ast::Selection::InlineFragment(_) => None,
    })
}

fn plain_fields<'a>(set: ast::SelectionSet<'a, String>) -> Result<Vec<Field<'a>>, QueryError> {
    set.items
        .into_iter()
        .map(|item| {
            check_selection(&item)?;
            match item {
                ast::Selection::Field(field) => Ok(field),
                // check_selection rejects both fragment forms.
                ast::Selection::FragmentSpread(_) | ast::Selection::InlineFragment(_) => {
                    Err(QueryError::Unsupported("fragments".into()))
                }
            }
        })
        .collect()
}

fn check_selection(item: &ast::Selection<'_, String>) -> Result<(), QueryError> {
    match item {
        ast::Selection::Field(field) => {
            if let Some(directive) = field.directives.first() {
                return Err(directive_error(directive));
            }
            field.selection_set.items.iter().try_for_each(check_selection)
        }
        ast::Selection::FragmentSpread(spread) => Err(QueryError::Unsupported(format!(
            "fragment spread `...{}`",
            spread.fragment_name
        ))),
        ast::Selection::InlineFragment(_) => {
            Err(QueryError::Unsupported("inline fragment".into()))
        }
    }
}

fn directive_error(directive: &ast::Directive<'_, String>) -> QueryError {
    QueryError::Unsupported(format!("directive `@{}`", directive.name))
}
