mod common;

use chrono::{TimeZone, Utc};
use common::*;
use fieldnotes::{Filter, OrderBy, OrmError, Query, RelationPath, Storage};
use serde_json::json;

#[tokio::test]
async fn find_on_empty_table_returns_nothing() {
    let (session, _) = counting_session();
    let found = session
        .queries()
        .find("added_locations", &Filter::new().eq("user_id", 7), None)
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn find_by_primary_key_round_trips_values() {
    let (session, _) = counting_session();
    let saved = user(&session, "ada@example.com").await;
    let found = session
        .queries()
        .find_by_primary_key("users", key(&saved), None)
        .await
        .unwrap()
        .unwrap();
    for col in ["email", "name", "lat", "lng", "formatted_address", "created_at"] {
        assert_eq!(found.get(col).unwrap(), saved.get(col).unwrap(), "{col}");
    }
    assert!(!found.is_new());
    assert!(!found.is_dirty());

    let missing = session.queries().find_by_primary_key("users", 999, None).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn unknown_entity_and_column_are_rejected() {
    let (session, _) = counting_session();
    let err = session.queries().find("comments", &Filter::new(), None).await.unwrap_err();
    assert!(matches!(err, OrmError::UnknownEntity(_)));
    let err = session
        .queries()
        .find("users", &Filter::new().eq("nickname", "ada"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownColumn { .. }));
}

#[tokio::test]
async fn filters_support_comparisons_and_membership() {
    let (session, _) = counting_session();
    let tags = [tag(&session, "a").await, tag(&session, "b").await, tag(&session, "c").await];
    let q = session.queries();

    let gt = q.find("tags", &Filter::new().gt("id", key(&tags[0])), None).await.unwrap();
    assert_eq!(gt.len(), 2);
    let lt = q.find("tags", &Filter::new().lt("slug", "b"), None).await.unwrap();
    assert_eq!(lt.len(), 1);
    let within = q
        .find("tags", &Filter::new().is_in("slug", ["a", "c", "z"]), None)
        .await
        .unwrap();
    let slugs: Vec<_> = within.iter().map(|t| t.get("slug").unwrap().clone()).collect();
    assert_eq!(slugs, vec![json!("a"), json!("c")]);
    let none = q
        .find("tags", &Filter::new().is_in("slug", Vec::<String>::new()), None)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn ordering_and_paging() {
    let (session, _) = counting_session();
    for slug in ["m", "a", "z", "q"] {
        tag(&session, slug).await;
    }
    let page = session
        .queries()
        .run(&Query::new("tags").order_by(OrderBy::desc("slug")).offset(1).limit(2))
        .await
        .unwrap();
    let slugs: Vec<_> = page.iter().map(|t| t.get("slug").unwrap().clone()).collect();
    assert_eq!(slugs, vec![json!("q"), json!("m")]);
}

#[tokio::test]
async fn relations_must_be_resolved_before_reading() {
    let (session, _) = counting_session();
    let u = user(&session, "ada@example.com").await;
    let err = u.related("posts").unwrap_err();
    assert!(matches!(err, OrmError::RelationNotResolved { .. }));
    let err = u.related("followers").unwrap_err();
    assert!(matches!(err, OrmError::UnknownRelation { .. }));
}

#[tokio::test]
async fn has_many_over_many_entities_is_one_query() {
    let (session, storage) = counting_session();
    let cat = category(&session, "travel").await;
    let mut authors = Vec::new();
    for i in 0..3 {
        authors.push(user(&session, &format!("u{i}@example.com")).await);
    }
    post(&session, &authors[0], &cat, "one").await;
    post(&session, &authors[0], &cat, "two").await;
    post(&session, &authors[2], &cat, "three").await;

    let mut users = session.queries().find("users", &Filter::new(), None).await.unwrap();
    storage.reset();
    session
        .resolver()
        .resolve(&mut users, &RelationPath::parse("posts"))
        .await
        .unwrap();
    assert_eq!(storage.selects(), 1);

    let counts: Vec<usize> = users.iter().map(|u| u.related_many("posts").unwrap().len()).collect();
    assert_eq!(counts, vec![2, 0, 1]);
}

#[tokio::test]
async fn re_resolving_belongs_to_issues_no_query() {
    let (session, storage) = counting_session();
    let cat = category(&session, "travel").await;
    let author = user(&session, "ada@example.com").await;
    post(&session, &author, &cat, "one").await;
    post(&session, &author, &cat, "two").await;

    let path = RelationPath::parse("author");
    let mut posts = session.queries().find("posts", &Filter::new(), Some(&path)).await.unwrap();
    let before = posts[0].clone();

    storage.reset();
    session.resolver().resolve(&mut posts, &path).await.unwrap();
    assert_eq!(storage.selects(), 0);
    assert_eq!(posts[0], before);
    let resolved = posts[1].related_one("author").unwrap().unwrap();
    assert_eq!(resolved.get("email").unwrap(), &json!("ada@example.com"));
}

#[tokio::test]
async fn belongs_to_many_orders_targets_by_key() {
    let (session, storage) = counting_session();
    let cat = category(&session, "travel").await;
    let author = user(&session, "ada@example.com").await;
    let mut p = post(&session, &author, &cat, "one").await;
    let mut tags = Vec::new();
    for slug in ["t1", "t2", "t3", "t4", "t5", "t6"] {
        tags.push(tag(&session, slug).await);
    }
    session.writer().link(&mut p, "tags", &tags[5]).await.unwrap();
    session.writer().link(&mut p, "tags", &tags[4]).await.unwrap();
    // linking twice keeps a single join row
    session.writer().link(&mut p, "tags", &tags[4]).await.unwrap();
    assert_eq!(storage.row_count("posts_tags").await, 2);

    storage.reset();
    session
        .resolver()
        .resolve_one(&mut p, &RelationPath::parse("tags"))
        .await
        .unwrap();
    assert_eq!(storage.selects(), 2);
    let ids: Vec<i64> = p.related_many("tags").unwrap().iter().map(key).collect();
    assert_eq!(ids, vec![5, 6]);

    let ordered = RelationPath::parse("tags").order_by(OrderBy::desc("slug"));
    let mut again = session
        .queries()
        .find_by_primary_key("posts", key(&p), Some(&ordered))
        .await
        .unwrap()
        .unwrap();
    let ids: Vec<i64> = again.related_many("tags").unwrap().iter().map(key).collect();
    assert_eq!(ids, vec![6, 5]);

    session.writer().unlink(&mut again, "tags", &tags[5]).await.unwrap();
    assert!(matches!(
        again.related("tags"),
        Err(OrmError::RelationNotResolved { .. })
    ));
}

#[tokio::test]
async fn dangling_foreign_key_resolves_to_none() {
    let (session, storage) = counting_session();
    let cat = category(&session, "travel").await;
    let author = user(&session, "ada@example.com").await;
    let p = post(&session, &author, &cat, "one").await;

    // remove the category underneath the post, bypassing the writer
    let categories = session.entity("categories").unwrap();
    storage.delete_row(&categories, cat.primary_key().unwrap()).await.unwrap();

    let found = session
        .queries()
        .find_by_primary_key("posts", key(&p), Some(&RelationPath::parse("category")))
        .await
        .unwrap()
        .unwrap();
    assert!(found.related_one("category").unwrap().is_none());
}

#[tokio::test]
async fn nested_path_is_one_batch_per_segment() {
    let (session, storage) = counting_session();
    let travel = category(&session, "travel").await;
    let food = category(&session, "food").await;
    let author = user(&session, "ada@example.com").await;
    let mut p1 = post(&session, &author, &travel, "one").await;
    let mut p2 = post(&session, &author, &food, "two").await;
    post(&session, &author, &food, "three").await;
    let rust = tag(&session, "rust").await;
    let maps = tag(&session, "maps").await;
    session.writer().link(&mut p1, "tags", &rust).await.unwrap();
    session.writer().link(&mut p2, "tags", &rust).await.unwrap();
    session.writer().link(&mut p2, "tags", &maps).await.unwrap();

    storage.reset();
    let cats = session
        .queries()
        .find("categories", &Filter::new(), Some(&RelationPath::parse("posts.tags")))
        .await
        .unwrap();
    // base + posts + (join rows, tags)
    assert_eq!(storage.selects(), 4);

    let food_posts = cats[1].related_many("posts").unwrap();
    assert_eq!(food_posts.len(), 2);
    let tag_counts: Vec<usize> = food_posts.iter().map(|p| p.related_many("tags").unwrap().len()).collect();
    assert_eq!(tag_counts, vec![2, 0]);
    assert_eq!(cats[0].related_many("posts").unwrap()[0].related_many("tags").unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_relation_in_path_fails() {
    let (session, _) = counting_session();
    user(&session, "ada@example.com").await;
    let err = session
        .queries()
        .find("users", &Filter::new(), Some(&RelationPath::parse("friends")))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownRelation { .. }));
}

#[tokio::test]
async fn live_at_hides_expired_rows() {
    let (session, _) = counting_session();
    let owner = user(&session, "ada@example.com").await;
    location(&session, &owner, "2020-01-01T00:00:00Z").await;
    let fresh = location(&session, &owner, "2999-01-01T00:00:00Z").await;

    let all = session.queries().run(&Query::new("added_locations")).await.unwrap();
    assert_eq!(all.len(), 2);

    let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
    let live = session
        .queries()
        .run(&Query::new("added_locations").live_at(now))
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(key(&live[0]), key(&fresh));

    // entities without an expiry column ignore live_at
    let users = session.queries().run(&Query::new("users").live_at(now)).await.unwrap();
    assert_eq!(users.len(), 1);

    // expiry is compared below the second
    location(&session, &owner, "2026-10-19T12:00:00.500Z").await;
    let later_today = location(&session, &owner, "2026-10-19T12:00:00.900Z").await;
    let at = now + chrono::Duration::milliseconds(700);
    let live = session
        .queries()
        .run(&Query::new("added_locations").live_at(at))
        .await
        .unwrap();
    let keys: Vec<i64> = live.iter().map(key).collect();
    assert_eq!(keys, vec![key(&fresh), key(&later_today)]);
}
