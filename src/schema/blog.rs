//! Bundled schema for the blog service: users, location annotations, categories, posts and tags.

use crate::error::OrmError;
use crate::schema::loader::{load_registry, SchemaDocument};
use crate::schema::registry::SchemaRegistry;

const BLOG_SCHEMA: &str = include_str!("../../schema/blog.json");

pub fn document() -> Result<SchemaDocument, OrmError> {
    Ok(SchemaDocument::from_json_str(BLOG_SCHEMA)?)
}

pub fn registry() -> Result<SchemaRegistry, OrmError> {
    load_registry(&document()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::RelationKind;

    #[test]
    fn bundled_schema_is_valid() {
        let reg = registry().unwrap();
        let names: Vec<_> = reg.entities().map(|e| e.name().to_string()).collect();
        assert_eq!(
            names,
            vec!["users", "added_locations", "categories", "posts", "tags", "posts_tags"]
        );
    }

    #[test]
    fn posts_reach_tags_through_the_join_entity() {
        let reg = registry().unwrap();
        let posts = reg.resolve("posts").unwrap();
        assert_eq!(posts.primary_key(), "id");
        assert!(posts.has_timestamps());
        match &posts.relation("tags").unwrap().kind {
            RelationKind::BelongsToMany { join_entity, this_key, other_key } => {
                assert_eq!(join_entity, "posts_tags");
                assert_eq!(this_key, "post_id");
                assert_eq!(other_key, "tag_id");
            }
            other => panic!("unexpected relation kind {:?}", other),
        }
    }

    #[test]
    fn locations_declare_their_expiry_column() {
        let reg = registry().unwrap();
        assert_eq!(
            reg.resolve("added_locations").unwrap().expiry_column(),
            Some("remove_after")
        );
    }
}
