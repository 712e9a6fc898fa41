use std::sync::Arc;
use uuid::Uuid;
use carpool_core::{CoreError, CoreResult, NotificationRepository};
use carpool_shared::{NotificationPage, UserId};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Read side of the per-user notification inbox
#[derive(Clone)]
pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    /// Newest first. Missing or nonsensical paging falls back to the defaults.
    pub async fn list(&self, user_id: UserId, page: Option<i64>, page_size: Option<i64>) -> CoreResult<NotificationPage> {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Ok(self.repo.list_notifications(user_id, page, page_size).await?)
    }

    pub async fn mark_read(&self, notification_id: Uuid, user_id: UserId) -> CoreResult<()> {
        if self.repo.mark_read(notification_id, user_id).await? {
            Ok(())
        } else {
            Err(CoreError::NotFound(format!("notification {}", notification_id)))
        }
    }

    /// Returns how many notifications changed
    pub async fn mark_all_read(&self, user_id: UserId) -> CoreResult<u64> {
        Ok(self.repo.mark_all_read(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpool_shared::Notification;
    use carpool_store::memory::MemoryStore;

    async fn seeded(user: UserId, n: usize) -> (Arc<MemoryStore>, NotificationService) {
        let store = Arc::new(MemoryStore::new());
        for i in 0..n {
            let note = Notification::about_trip(user, Uuid::new_v4(), format!("t{}", i), "c");
            store.create_notification(&note).await.unwrap();
        }
        (store.clone(), NotificationService::new(store))
    }

    #[tokio::test]
    async fn test_list_defaults_and_caps() {
        let user = Uuid::new_v4();
        let (_store, service) = seeded(user, 25).await;

        let page = service.list(user, None, None).await.unwrap();
        assert_eq!(page.list.len(), 20);
        assert_eq!(page.total, 25);
        assert_eq!(page.unread, 25);

        let page = service.list(user, Some(0), Some(1000)).await.unwrap();
        assert_eq!(page.list.len(), 25);

        let page = service.list(user, Some(2), Some(20)).await.unwrap();
        assert_eq!(page.list.len(), 5);
    }

    #[tokio::test]
    async fn test_mark_read_only_own() {
        let user = Uuid::new_v4();
        let (store, service) = seeded(user, 2).await;
        let id = store.notifications_for(user)[0].id;

        let err = service.mark_read(id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        service.mark_read(id, user).await.unwrap();
        assert_eq!(service.list(user, None, None).await.unwrap().unread, 1);

        assert_eq!(service.mark_all_read(user).await.unwrap(), 1);
        assert_eq!(service.mark_all_read(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_notification() {
        let (_store, service) = seeded(Uuid::new_v4(), 0).await;
        let err = service.mark_read(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
