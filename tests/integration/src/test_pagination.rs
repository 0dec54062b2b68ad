//! Page fetch accounting for lazy query and scan streams.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::{StreamExt, TryStreamExt};

    use dynarepo_core::config::MemoryStoreConfig;
    use dynarepo_core::memory::MemoryClient;
    use dynarepo_core::{QueryOptions, RepositoryConfig, ScanOptions};

    use crate::counting::CountingClient;
    use crate::models::{CommentDraft, CommentRepository};
    use crate::{blog_table, test_table_name};

    type Counted = CountingClient<MemoryClient>;

    /// A counting client over a blog table holding `n` comments on `post2`
    /// and one on `post3`.
    async fn comments(
        n: usize,
        config: MemoryStoreConfig,
    ) -> (Arc<Counted>, CommentRepository<Counted>) {
        crate::init_tracing();
        let table = test_table_name("pages");
        let inner = MemoryClient::with_config(config);
        inner.create_table(&blog_table(&table)).unwrap();
        let client = Arc::new(CountingClient::new(inner));
        let repo = CommentRepository::new(Arc::clone(&client), &table);

        for i in 0..n {
            repo.put(CommentDraft {
                post_id: Some("post2".to_owned()),
                id: Some(format!("{i:03}")),
                author: Some("ann".to_owned()),
                body: Some(format!("comment {i}")),
            })
            .await
            .unwrap();
        }
        repo.put(CommentDraft {
            post_id: Some("post3".to_owned()),
            id: Some("000".to_owned()),
            author: Some("bob".to_owned()),
            body: Some("elsewhere".to_owned()),
        })
        .await
        .unwrap();
        client.reset();
        (client, repo)
    }

    async fn count_fetches(n: usize, page_size: u32) -> (usize, usize) {
        let (client, repo) = comments(n, MemoryStoreConfig::default()).await;
        let found: Vec<_> = repo
            .comments_for_post("post2", QueryOptions::new().page_size(page_size))
            .try_collect()
            .await
            .unwrap();
        (found.len(), client.pages())
    }

    #[tokio::test]
    async fn test_should_fetch_trailing_empty_page_when_divisible() {
        assert_eq!(count_fetches(4, 2).await, (4, 3));
        assert_eq!(count_fetches(9, 3).await, (9, 4));
    }

    #[tokio::test]
    async fn test_should_fetch_ceil_pages_when_not_divisible() {
        assert_eq!(count_fetches(4, 3).await, (4, 2));
        assert_eq!(count_fetches(10, 4).await, (10, 3));
        assert_eq!(count_fetches(1, 5).await, (1, 1));
    }

    #[tokio::test]
    async fn test_should_fetch_single_page_for_empty_partition() {
        assert_eq!(count_fetches(0, 2).await, (0, 1));
    }

    #[tokio::test]
    async fn test_should_fetch_pages_only_as_consumed() {
        let (client, repo) = comments(6, MemoryStoreConfig::default()).await;
        let mut stream = repo.comments_for_post("post2", QueryOptions::new().page_size(2));

        assert_eq!(client.pages(), 0);
        stream.next().await.unwrap().unwrap();
        assert_eq!(client.pages(), 1);
        stream.next().await.unwrap().unwrap();
        assert_eq!(client.pages(), 1);
        stream.next().await.unwrap().unwrap();
        assert_eq!(client.pages(), 2);

        // Dropping the stream stops further fetches.
        drop(stream);
        assert_eq!(client.pages(), 2);
    }

    #[tokio::test]
    async fn test_should_use_repository_config_page_size() {
        let (client, repo) = comments(5, MemoryStoreConfig::default()).await;
        let repo = CommentRepository::from_repository(
            repo.inner()
                .clone()
                .with_config(RepositoryConfig::default().with_page_size(2)),
        );

        let found: Vec<_> = repo
            .comments_for_post("post2", QueryOptions::new())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(found.len(), 5);
        assert_eq!(client.pages(), 3);
    }

    #[tokio::test]
    async fn test_should_follow_store_page_cap() {
        let config = MemoryStoreConfig {
            default_page_size: Some(2),
        };
        let (client, repo) = comments(3, config).await;

        let found: Vec<_> = repo
            .comments_for_post("post2", QueryOptions::new())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(client.pages(), 2);
    }

    #[tokio::test]
    async fn test_should_paginate_scan() {
        let (client, repo) = comments(5, MemoryStoreConfig::default()).await;
        let found: Vec<_> = repo
            .inner()
            .scan(ScanOptions::new().page_size(2))
            .try_collect()
            .await
            .unwrap();
        // Five comments on post2 and one on post3.
        assert_eq!(found.len(), 6);
        assert_eq!(client.pages(), 4);
    }
}
