//! Repository tests against a running DynamoDB-compatible server.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aws_sdk_dynamodb::types::{
        AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
    };
    use futures::TryStreamExt;

    use dynarepo_core::aws::DynamoDbClient;
    use dynarepo_core::{QueryOptions, Repository, ScanOptions};

    use crate::models::{CommentDraft, CommentRepository, PostDraft, PostSchema, post_key};
    use crate::{dynamodb_client, test_table_name};

    /// Helper: create the blog table with `pk`/`sk` string keys.
    async fn create_blog_table(client: &aws_sdk_dynamodb::Client, table_name: &str) {
        client
            .create_table()
            .table_name(table_name)
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("pk")
                    .key_type(KeyType::Hash)
                    .build()
                    .unwrap(),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("sk")
                    .key_type(KeyType::Range)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("pk")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("sk")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .unwrap_or_else(|e| panic!("failed to create table {table_name}: {e}"));
    }

    async fn delete_table(client: &aws_sdk_dynamodb::Client, table_name: &str) {
        let _ = client.delete_table().table_name(table_name).send().await;
    }

    fn comment(post_id: &str, id: &str) -> CommentDraft {
        CommentDraft {
            post_id: Some(post_id.to_owned()),
            id: Some(id.to_owned()),
            author: Some("ann".to_owned()),
            body: Some(format!("comment {id}")),
        }
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_round_trip_post() {
        let sdk = dynamodb_client();
        let table_name = test_table_name("post");
        create_blog_table(&sdk, &table_name).await;

        let client = Arc::new(DynamoDbClient::new(sdk.clone()));
        let posts = Repository::new(client, &table_name, PostSchema);
        let stored = posts
            .put(PostDraft {
                id: None,
                title: Some("Live".to_owned()),
                body: Some("hello".to_owned()),
            })
            .await
            .unwrap();
        let fetched = posts.get(posts.key_of(&stored)).await.unwrap();
        assert_eq!(fetched, stored);

        let err = posts.get(post_key("post-missing")).await.unwrap_err();
        assert!(err.is_not_found());

        delete_table(&sdk, &table_name).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_query_comments_by_prefix() {
        let sdk = dynamodb_client();
        let table_name = test_table_name("prefix");
        create_blog_table(&sdk, &table_name).await;

        let client = Arc::new(DynamoDbClient::new(sdk.clone()));
        let posts = Repository::new(Arc::clone(&client), &table_name, PostSchema);
        posts
            .put(PostDraft {
                id: Some("post2".to_owned()),
                title: Some("Hello".to_owned()),
                body: None,
            })
            .await
            .unwrap();

        let comments = CommentRepository::new(client, &table_name);
        for id in ["1", "2", "3", "4"] {
            comments.put(comment("post2", id)).await.unwrap();
        }

        let found: Vec<_> = comments
            .comments_for_post("post2", QueryOptions::new().page_size(2))
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3", "4"]);

        let everything = comments
            .inner()
            .scan(ScanOptions::new().page_size(3))
            .try_collect::<Vec<_>>()
            .await;
        // The post item fails the comment schema, so a full scan errors.
        assert!(everything.unwrap_err().violation().is_some());

        delete_table(&sdk, &table_name).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_pass_sdk_errors_through() {
        let client = Arc::new(DynamoDbClient::new(dynamodb_client()));
        let posts = Repository::new(client, test_table_name("absent"), PostSchema);

        let err = posts.get(post_key("post2")).await.unwrap_err();
        assert!(matches!(
            err.storage(),
            Some(aws_sdk_dynamodb::Error::ResourceNotFoundException(_))
        ));
    }
}
