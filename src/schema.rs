//! The fixed LDBC file-to-graph mapping and its ordering check.
//!
//! Field names are the canonical names produced by [`crate::columns`]: a plain
//! `Person.id` column becomes `personid`, while the `Person.id`/`Person.id.1` pair of the
//! knows table becomes `personto`/`personfrom`.

use crate::error::{ImportError, Result};
use crate::models::Label;
use crate::models::RelType;
use crate::source::{LoadOptions, RowFilter};
use crate::store::EdgePattern;
use rustc_hash::FxHashSet;
use std::fmt;

#[derive(Debug, Clone, Copy)]
pub struct SourceFile {
    /// Path relative to the data directory
    pub path: &'static str,
    pub options: LoadOptions,
}

#[derive(Debug, Clone)]
pub struct NodeStep {
    pub label: Label,
    pub source: SourceFile,
}

#[derive(Debug, Clone)]
pub struct RelationshipStep {
    pub pattern: EdgePattern,
    pub source: SourceFile,
    pub start_id_field: &'static str,
    pub end_id_field: &'static str,
    /// `(relationship property, source field)` pairs
    pub properties: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone)]
pub enum ImportStep {
    Nodes(NodeStep),
    Relationships(RelationshipStep),
}

impl ImportStep {
    pub fn source(&self) -> &SourceFile {
        match self {
            ImportStep::Nodes(step) => &step.source,
            ImportStep::Relationships(step) => &step.source,
        }
    }
}

impl fmt::Display for ImportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStep::Nodes(step) => write!(f, "{} nodes", step.label),
            ImportStep::Relationships(step) => write!(f, "{}", step.pattern),
        }
    }
}

const NO_OPTIONS: LoadOptions = LoadOptions {
    date_fields: &[],
    keep_columns: None,
    filter: None,
};

const ID_ONLY: LoadOptions = LoadOptions {
    date_fields: &[],
    keep_columns: Some(&["id"]),
    filter: None,
};

const ORGANISATION_FILE: &str = "test/static/organisation_0_0.csv";

fn organisation(kind: &'static str) -> SourceFile {
    SourceFile {
        path: ORGANISATION_FILE,
        options: LoadOptions {
            date_fields: &[],
            keep_columns: Some(&["id", "type"]),
            filter: Some(RowFilter {
                field: "type",
                equals: kind,
            }),
        },
    }
}

fn nodes(label: Label, path: &'static str, options: LoadOptions) -> ImportStep {
    ImportStep::Nodes(NodeStep {
        label,
        source: SourceFile { path, options },
    })
}

fn relationships(
    (start, rel, end): (Label, RelType, Label),
    path: &'static str,
    (start_id_field, end_id_field): (&'static str, &'static str),
    date_fields: &'static [&'static str],
    properties: &'static [(&'static str, &'static str)],
) -> ImportStep {
    ImportStep::Relationships(RelationshipStep {
        pattern: EdgePattern { start, rel, end },
        source: SourceFile {
            path,
            options: LoadOptions {
                date_fields,
                ..NO_OPTIONS
            },
        },
        start_id_field,
        end_id_field,
        properties,
    })
}

/// Every step of a full LDBC load, in execution order.
pub fn ldbc_plan() -> Vec<ImportStep> {
    use Label::*;

    vec![
        nodes(
            Person,
            "test/dynamic/person_0_0.csv",
            LoadOptions {
                date_fields: &["birthday", "creationDate"],
                ..NO_OPTIONS
            },
        ),
        nodes(Tag, "test/static/tag_0_0.csv", NO_OPTIONS),
        nodes(Comment, "test/dynamic/comment_0_0.csv", ID_ONLY),
        nodes(
            Forum,
            "test/dynamic/forum_0_0.csv",
            LoadOptions {
                date_fields: &["creationDate"],
                ..NO_OPTIONS
            },
        ),
        nodes(Post, "test/dynamic/post_0_0.csv", ID_ONLY),
        ImportStep::Nodes(NodeStep {
            label: University,
            source: organisation("university"),
        }),
        ImportStep::Nodes(NodeStep {
            label: Company,
            source: organisation("company"),
        }),
        relationships(
            (Person, RelType::Knows, Person),
            "test/dynamic/person_knows_person_0_0.csv",
            ("personto", "personfrom"),
            &["creationDate"],
            &[("creationDate", "creationDate")],
        ),
        relationships(
            (Person, RelType::Interest, Tag),
            "test/dynamic/person_hasInterest_tag_0_0.csv",
            ("personid", "tagid"),
            &[],
            &[],
        ),
        relationships(
            (Person, RelType::LikesComment, Comment),
            "test/dynamic/person_likes_comment_0_0.csv",
            ("personid", "commentid"),
            &[],
            &[],
        ),
        relationships(
            (Person, RelType::Member, Forum),
            "test/dynamic/forum_hasMember_person_0_0.csv",
            ("personid", "forumid"),
            &["joinDate"],
            &[("joinDate", "joinDate")],
        ),
        relationships(
            (Forum, RelType::Moderator, Person),
            "test/dynamic/forum_hasModerator_person_0_0.csv",
            ("forumid", "personid"),
            &[],
            &[],
        ),
        relationships(
            (Forum, RelType::HasTag, Tag),
            "test/dynamic/forum_hasTag_tag_0_0.csv",
            ("forumid", "tagid"),
            &[],
            &[],
        ),
        relationships(
            (Person, RelType::LikesPost, Post),
            "test/dynamic/person_likes_post_0_0.csv",
            ("personid", "postid"),
            &[],
            &[],
        ),
        relationships(
            (Comment, RelType::Tagged, Tag),
            "test/dynamic/comment_hasTag_tag_0_0.csv",
            ("commentid", "tagid"),
            &[],
            &[],
        ),
        relationships(
            (Post, RelType::Tagged, Tag),
            "test/dynamic/post_hasTag_tag_0_0.csv",
            ("postid", "tagid"),
            &[],
            &[],
        ),
        relationships(
            (Person, RelType::WorkAt, Company),
            "test/dynamic/person_workAt_organisation_0_0.csv",
            ("personid", "organisationid"),
            &[],
            &[("workFrom", "workFrom")],
        ),
        relationships(
            (Person, RelType::StudyAt, University),
            "test/dynamic/person_studyAt_organisation_0_0.csv",
            ("personid", "organisationid"),
            &[],
            &[("classYear", "classYear")],
        ),
        relationships(
            (Comment, RelType::HasCreatorComment, Person),
            "test/dynamic/comment_hasCreator_person_0_0.csv",
            ("commentid", "personid"),
            &[],
            &[],
        ),
        relationships(
            (Post, RelType::HasCreatorPost, Person),
            "test/dynamic/post_hasCreator_person_0_0.csv",
            ("postid", "personid"),
            &[],
            &[],
        ),
    ]
}

/// Node labels in first-appearance order.
pub fn node_labels(plan: &[ImportStep]) -> Vec<Label> {
    let mut seen = FxHashSet::default();
    plan.iter()
        .filter_map(|step| match step {
            ImportStep::Nodes(n) => Some(n.label),
            ImportStep::Relationships(_) => None,
        })
        .filter(|label| seen.insert(*label))
        .collect()
}

/// Checks that all node steps precede all relationship steps and that every
/// relationship's endpoint labels are loaded by an earlier node step.
pub fn validate(plan: &[ImportStep]) -> Result<()> {
    let mut loaded: FxHashSet<Label> = FxHashSet::default();
    let mut in_relationships = false;

    for step in plan {
        match step {
            ImportStep::Nodes(n) => {
                if in_relationships {
                    return Err(ImportError::Plan(format!(
                        "{step} is scheduled after relationship steps"
                    )));
                }
                loaded.insert(n.label);
            }
            ImportStep::Relationships(r) => {
                in_relationships = true;
                for label in [r.pattern.start, r.pattern.end] {
                    if !loaded.contains(&label) {
                        return Err(ImportError::Plan(format!(
                            "{step} needs {label} nodes, which are not loaded before it"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ldbc_plan_is_ordered() {
        validate(&ldbc_plan()).unwrap();
    }

    #[test]
    fn ldbc_plan_shape() {
        let plan = ldbc_plan();
        let node_steps = plan
            .iter()
            .filter(|s| matches!(s, ImportStep::Nodes(_)))
            .count();
        assert_eq!(node_steps, 7);
        assert_eq!(plan.len() - node_steps, 13);
        assert_eq!(
            node_labels(&plan),
            vec![
                Label::Person,
                Label::Tag,
                Label::Comment,
                Label::Forum,
                Label::Post,
                Label::University,
                Label::Company,
            ]
        );
    }

    #[test]
    fn every_relationship_endpoint_loaded_earlier() {
        let plan = ldbc_plan();
        for (i, step) in plan.iter().enumerate() {
            if let ImportStep::Relationships(r) = step {
                for label in [r.pattern.start, r.pattern.end] {
                    let loaded_before = plan[..i]
                        .iter()
                        .any(|s| matches!(s, ImportStep::Nodes(n) if n.label == label));
                    assert!(loaded_before, "{step} before {label} nodes");
                }
            }
        }
    }

    #[test]
    fn relationship_before_its_nodes_is_rejected() {
        let mut plan = ldbc_plan();
        let person = plan.remove(0);
        plan.insert(7, person);
        let err = validate(&plan).unwrap_err();
        assert!(err.to_string().contains("needs Person nodes"));
    }

    #[test]
    fn node_step_after_relationships_is_rejected() {
        let mut plan = ldbc_plan();
        let tag = plan[1].clone();
        plan.push(tag);
        let err = validate(&plan).unwrap_err();
        assert!(err.to_string().contains("Tag nodes is scheduled after relationship steps"));
    }

    #[test]
    fn missing_node_step_is_rejected() {
        let plan: Vec<ImportStep> = ldbc_plan()
            .into_iter()
            .filter(|s| !matches!(s, ImportStep::Nodes(n) if n.label == Label::Tag))
            .collect();
        let err = validate(&plan).unwrap_err();
        assert!(err.to_string().contains("needs Tag nodes"));
    }

    #[test]
    fn step_names() {
        let plan = ldbc_plan();
        assert_eq!(plan[0].to_string(), "Person nodes");
        assert_eq!(plan[7].to_string(), "(Person)-[:KNOWS]->(Person)");
    }
}
