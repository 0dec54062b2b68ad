//! Repository behavior over the in-memory client.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::{StreamExt, TryStreamExt};

    use dynarepo_core::memory::MemoryClient;
    use dynarepo_core::{
        AttributeExpression, CompileError, KeyConditions, QueryOptions, Repository,
        RepositoryError, ScanOptions, compile_key_condition,
    };
    use dynarepo_model::StoreErrorCode;

    use crate::counting::CountingClient;
    use crate::models::{
        CommentDraft, CommentRepository, MAX_TITLE, PostDraft, PostSchema, post_key,
    };
    use crate::{blog_table, memory_client, test_table_name};

    fn draft(id: Option<&str>, title: &str) -> PostDraft {
        PostDraft {
            id: id.map(ToOwned::to_owned),
            title: Some(title.to_owned()),
            body: Some("body".to_owned()),
        }
    }

    fn comment(post_id: &str, id: &str, author: &str) -> CommentDraft {
        CommentDraft {
            post_id: Some(post_id.to_owned()),
            id: Some(id.to_owned()),
            author: Some(author.to_owned()),
            body: Some(format!("{author} on {post_id}")),
        }
    }

    /// Post `post2` with four comments, plus one comment on `post3`.
    async fn seed_blog(client: &Arc<MemoryClient>, table: &str) {
        let posts = Repository::new(Arc::clone(client), table, PostSchema);
        posts.put(draft(Some("post2"), "Hello")).await.unwrap();

        let comments = CommentRepository::new(Arc::clone(client), table);
        for (id, author) in [("1", "ann"), ("2", "bob"), ("3", "ann"), ("4", "cy")] {
            comments.put(comment("post2", id, author)).await.unwrap();
        }
        comments.put(comment("post3", "1", "ann")).await.unwrap();
    }

    // -----------------------------------------------------------------------
    // put / get
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_round_trip_with_generated_id() {
        let table = test_table_name("round-trip");
        let repo = Repository::new(memory_client(&table).unwrap(), &table, PostSchema);

        let stored = repo.put(draft(None, "Generated")).await.unwrap();
        assert!(stored.id.starts_with("post-"));

        let fetched = repo.get(repo.key_of(&stored)).await.unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_should_put_idempotently() {
        let table = test_table_name("idempotent");
        let client = memory_client(&table).unwrap();
        let repo = Repository::new(Arc::clone(&client), &table, PostSchema);

        let first = repo.put(draft(Some("post7"), "Same")).await.unwrap();
        let second = repo
            .put(draft(Some(first.id.as_str()), &first.title))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(client.item_count(&table).unwrap(), 1);
        assert_eq!(repo.get(post_key("post7")).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_should_overwrite_on_second_put() {
        let table = test_table_name("overwrite");
        let repo = Repository::new(memory_client(&table).unwrap(), &table, PostSchema);

        repo.put(draft(Some("post8"), "Before")).await.unwrap();
        repo.put(draft(Some("post8"), "After")).await.unwrap();
        assert_eq!(repo.get(post_key("post8")).await.unwrap().title, "After");
    }

    #[tokio::test]
    async fn test_should_fail_get_with_not_found() {
        let table = test_table_name("not-found");
        let repo = Repository::new(memory_client(&table).unwrap(), &table, PostSchema);

        let err = repo.get(post_key("post404")).await.unwrap_err();
        let RepositoryError::NotFound { table: name, key } = &err else {
            panic!("expected NotFound, got {err:?}");
        };
        assert_eq!(name, &table);
        assert_eq!(key, &post_key("post404"));
    }

    #[tokio::test]
    async fn test_should_not_write_when_required_field_missing() {
        let table = test_table_name("missing-field");
        let client = CountingClient::new(MemoryClient::new());
        client.inner().create_table(&blog_table(&table)).unwrap();
        let client = Arc::new(client);
        let repo = Repository::new(Arc::clone(&client), &table, PostSchema);

        let err = repo
            .put(PostDraft {
                id: Some("post9".to_owned()),
                title: None,
                body: None,
            })
            .await
            .unwrap_err();
        let violation = err.violation().unwrap();
        assert!(violation.has_field("title"));
        assert_eq!(violation.issues[0].rule, "required");
        assert_eq!(client.puts(), 0);

        assert!(repo.get(post_key("post9")).await.unwrap_err().is_not_found());
        assert_eq!(client.gets(), 1);
    }

    #[tokio::test]
    async fn test_should_read_each_get_with_one_point_lookup() {
        let table = test_table_name("point-read");
        let client = CountingClient::new(MemoryClient::new());
        client.inner().create_table(&blog_table(&table)).unwrap();
        let client = Arc::new(client);
        let repo = Repository::new(Arc::clone(&client), &table, PostSchema);

        repo.put(draft(Some("post5"), "Counted")).await.unwrap();
        assert_eq!((client.puts(), client.gets()), (1, 0));

        repo.get(post_key("post5")).await.unwrap();
        assert_eq!(client.gets(), 1);
        repo.get(post_key("post6")).await.unwrap_err();
        assert_eq!(client.gets(), 2);
        assert_eq!(client.pages(), 0);
    }

    #[tokio::test]
    async fn test_should_reject_overlong_title() {
        let table = test_table_name("title");
        let repo = Repository::new(memory_client(&table).unwrap(), &table, PostSchema);

        let err = repo
            .put(draft(None, &"x".repeat(MAX_TITLE + 1)))
            .await
            .unwrap_err();
        assert_eq!(err.violation().unwrap().issues[0].rule, "max_length");
    }

    #[tokio::test]
    async fn test_should_reject_stored_item_of_wrong_shape() {
        let table = test_table_name("wrong-shape");
        let client = memory_client(&table).unwrap();
        seed_blog(&client, &table).await;

        // Reading a comment item through the post schema.
        let posts = Repository::new(Arc::clone(&client), &table, PostSchema);
        let err = posts
            .get(crate::models::comment_key("post2", "1"))
            .await
            .unwrap_err();
        assert!(err.violation().is_some());
    }

    #[tokio::test]
    async fn test_should_pass_storage_errors_through_untouched() {
        let repo = Repository::new(Arc::new(MemoryClient::new()), "no-such-table", PostSchema);

        let err = repo.put(draft(Some("p"), "t")).await.unwrap_err();
        assert_eq!(
            err.storage().map(|e| e.code),
            Some(StoreErrorCode::ResourceNotFoundException)
        );
    }

    // -----------------------------------------------------------------------
    // query / scan
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_return_only_comments_for_prefix_query() {
        let table = test_table_name("prefix");
        let client = memory_client(&table).unwrap();
        seed_blog(&client, &table).await;

        let comments = CommentRepository::new(client, &table);
        let found: Vec<_> = comments
            .comments_for_post("post2", QueryOptions::new())
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3", "4"]);
        assert!(found.iter().all(|c| c.post_id == "post2"));
    }

    #[test]
    fn test_should_compile_prefix_query_conditions() {
        let conditions = KeyConditions::new()
            .and("pk", "post2")
            .and("sk", AttributeExpression::begins_with("comment"));
        let compiled = compile_key_condition(&conditions).unwrap();
        assert_eq!(compiled.expression, "pk = :pk and begins_with(sk, :sk)");
        assert_eq!(compiled.values.len(), 2);
    }

    #[test]
    fn test_should_reject_begins_with_as_comparison_tag() {
        let err = AttributeExpression::compare("begins_with", "comment").unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownOperator {
                operator: "begins_with".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn test_should_query_in_descending_order_with_filter() {
        let table = test_table_name("desc");
        let client = memory_client(&table).unwrap();
        seed_blog(&client, &table).await;

        let comments = CommentRepository::new(client, &table);
        let found: Vec<_> = comments
            .comments_for_post(
                "post2",
                QueryOptions::new()
                    .descending()
                    .filter(KeyConditions::new().and("author", "ann")),
            )
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["3", "1"]);
    }

    #[tokio::test]
    async fn test_should_query_secondary_index() {
        let table = test_table_name("index");
        let client = memory_client(&table).unwrap();
        seed_blog(&client, &table).await;

        let comments = CommentRepository::new(client, &table);
        let found: Vec<_> = comments
            .comments_by_author("ann")
            .try_collect()
            .await
            .unwrap();
        let keys: Vec<(&str, &str)> = found
            .iter()
            .map(|c| (c.post_id.as_str(), c.id.as_str()))
            .collect();
        assert_eq!(keys, [("post2", "1"), ("post3", "1"), ("post2", "3")]);
    }

    #[tokio::test]
    async fn test_should_end_stream_at_first_invalid_item() {
        let table = test_table_name("invalid");
        let client = memory_client(&table).unwrap();
        seed_blog(&client, &table).await;

        // The post item does not satisfy the comment schema.
        let comments = Repository::new(client, &table, crate::models::CommentSchema);
        let results: Vec<_> = comments
            .query(&KeyConditions::new().and("pk", "post2"), QueryOptions::new())
            .collect()
            .await;
        assert_eq!(results.len(), 5);
        assert!(results[..4].iter().all(Result::is_ok));
        assert!(results[4].as_ref().unwrap_err().violation().is_some());
    }

    #[tokio::test]
    async fn test_should_surface_malformed_condition_from_store() {
        let table = test_table_name("malformed");
        let client = memory_client(&table).unwrap();
        let repo = Repository::new(client, &table, PostSchema);

        // `title` is not a key attribute; the store rejects the condition.
        let results: Vec<_> = repo
            .query(
                &KeyConditions::new().and("pk", "post2").and("title", "x"),
                QueryOptions::new(),
            )
            .collect()
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().unwrap_err().storage().map(|e| e.code),
            Some(StoreErrorCode::ValidationException)
        );
    }

    #[tokio::test]
    async fn test_should_scan_every_item_with_filter() {
        let table = test_table_name("scan");
        let client = memory_client(&table).unwrap();
        seed_blog(&client, &table).await;

        let posts = Repository::new(client, &table, PostSchema);
        let found: Vec<_> = posts
            .scan(ScanOptions::new().filter(KeyConditions::new().and("sk", "post")))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "post2");
    }

    // -----------------------------------------------------------------------
    // sort-key ranges
    // -----------------------------------------------------------------------

    /// Comments `1` to `5` on `post2`, with no post item in the partition.
    async fn seed_comments(table: &str) -> CommentRepository<MemoryClient> {
        let client = memory_client(table).unwrap();
        let comments = CommentRepository::new(client, table);
        for id in ["1", "2", "3", "4", "5"] {
            comments.put(comment("post2", id, "ann")).await.unwrap();
        }
        comments
    }

    async fn comment_ids(
        comments: &CommentRepository<MemoryClient>,
        conditions: &KeyConditions,
        options: QueryOptions,
    ) -> Vec<String> {
        comments
            .inner()
            .query(conditions, options)
            .map_ok(|c| c.id)
            .try_collect()
            .await
            .unwrap()
    }

    fn sort_range(sk: AttributeExpression) -> KeyConditions {
        KeyConditions::new().and("pk", "post2").and("sk", sk)
    }

    #[tokio::test]
    async fn test_should_query_between_sort_keys_inclusively() {
        let table = test_table_name("between");
        let comments = seed_comments(&table).await;

        let ids = comment_ids(
            &comments,
            &sort_range(AttributeExpression::between("comment#2", "comment#4")),
            QueryOptions::new(),
        )
        .await;
        assert_eq!(ids, ["2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_should_query_above_sort_key_across_pages() {
        let table = test_table_name("above");
        let comments = seed_comments(&table).await;

        let gt = comment_ids(
            &comments,
            &sort_range(AttributeExpression::gt("comment#3")),
            QueryOptions::new().page_size(1),
        )
        .await;
        assert_eq!(gt, ["4", "5"]);

        let ge = comment_ids(
            &comments,
            &sort_range(AttributeExpression::ge("comment#3")),
            QueryOptions::new().page_size(2),
        )
        .await;
        assert_eq!(ge, ["3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_should_query_below_sort_key_in_either_order() {
        let table = test_table_name("below");
        let comments = seed_comments(&table).await;

        // Sort key listed before the partition key.
        let lt = KeyConditions::new()
            .and("sk", AttributeExpression::lt("comment#3"))
            .and("pk", "post2");
        assert_eq!(comment_ids(&comments, &lt, QueryOptions::new()).await, ["1", "2"]);
        assert_eq!(
            comment_ids(&comments, &lt, QueryOptions::new().descending()).await,
            ["2", "1"]
        );

        let le = sort_range(AttributeExpression::le("comment#3"));
        assert_eq!(
            comment_ids(&comments, &le, QueryOptions::new()).await,
            ["1", "2", "3"]
        );
    }

    #[tokio::test]
    async fn test_should_reject_inverted_between_from_store() {
        let table = test_table_name("inverted");
        let comments = seed_comments(&table).await;

        let results: Vec<_> = comments
            .inner()
            .query(
                &sort_range(AttributeExpression::between("comment#4", "comment#2")),
                QueryOptions::new(),
            )
            .collect()
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().unwrap_err().storage().map(|e| e.code),
            Some(StoreErrorCode::ValidationException)
        );
    }

    // -----------------------------------------------------------------------
    // concurrency
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_keep_one_item_under_concurrent_puts() {
        let table = test_table_name("concurrent");
        let client = memory_client(&table).unwrap();
        let repo = Repository::new(Arc::clone(&client), &table, PostSchema);

        let titles: Vec<String> = (0..16).map(|i| format!("v{i}")).collect();
        let tasks: Vec<_> = titles
            .iter()
            .map(|title| {
                let repo = repo.clone();
                let title = title.clone();
                tokio::spawn(async move { repo.put(draft(Some("post9"), &title)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(client.item_count(&table).unwrap(), 1);
        let stored = repo.get(post_key("post9")).await.unwrap();
        assert!(titles.contains(&stored.title), "unexpected title {}", stored.title);

        // Once the racing writers are done, the next write is the one read back.
        let (first, second) = tokio::join!(
            repo.put(draft(Some("post9"), "joined")),
            repo.put(draft(Some("post10"), "other")),
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(repo.get(post_key("post9")).await.unwrap().title, "joined");
        assert_eq!(client.item_count(&table).unwrap(), 2);
    }
}
