use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AuthError, AuthHandler};
use crate::background::{BackgroundTasks, EnrichmentJob};
use crate::database::models::{Car, CarPatch, FieldErrors, NewCar, User};
use crate::database::{DatabaseError, DocumentStore, Link, Repository, WriteRule};
use crate::media::{MediaUploader, Picture, UploadError, UploadOptions};

#[derive(Debug, Error)]
pub enum CarError {
    #[error("Car {0} not found")]
    NotFound(Uuid),

    #[error("User {0} not found")]
    OwnerNotFound(Uuid),

    #[error("Invalid car fields: {0:?}")]
    Invalid(FieldErrors),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Car listings: creation with a hosted picture, plus plain lookups and edits
pub struct CarService {
    cars: Repository<Car>,
    users: Repository<User>,
    auth: Arc<AuthHandler>,
    media: Arc<dyn MediaUploader>,
    background: BackgroundTasks,
    upload_options: UploadOptions,
}

impl CarService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<AuthHandler>,
        media: Arc<dyn MediaUploader>,
        background: BackgroundTasks,
        upload_options: UploadOptions,
    ) -> Self {
        Self {
            cars: Repository::new(Arc::clone(&store)),
            users: Repository::new(store),
            auth,
            media,
            background,
            upload_options,
        }
    }

    pub async fn list(&self) -> Result<Vec<Car>, CarError> {
        Ok(self.cars.find_all().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Car, CarError> {
        self.cars.get(id).await?.ok_or(CarError::NotFound(id))
    }

    /// Create a car owned by the bearer of `credential`.
    ///
    /// Each step needs the previous one to succeed, and nothing is written
    /// unless every step does. The enrichment job is queued only after the car
    /// is stored and is never awaited.
    pub async fn create_with_picture(
        &self,
        credential: &str,
        new_car: NewCar,
        picture: Picture,
    ) -> Result<Car, CarError> {
        let claims = self.auth.verify(credential)?;
        new_car.validate().map_err(CarError::Invalid)?;

        // Checked before the upload so a deleted account does not leave an orphaned picture
        let owner = self
            .users
            .get(claims.sub)
            .await?
            .ok_or(CarError::OwnerNotFound(claims.sub))?;
        let owner = Link::fetched(owner).ok_or(CarError::OwnerNotFound(claims.sub))?;

        let image = self.media.upload(picture, &self.upload_options).await?;

        let car = new_car.into_car(image.url, owner);
        let car = self.cars.insert(car, WriteRule::Write).await?;

        self.background.schedule(EnrichmentJob {
            brand: car.brand.clone(),
            make: car.make.clone(),
            year: car.year,
            picture_url: car.picture_url.clone(),
        });

        info!(
            "Created car {} ({} {}) for user {}",
            car.id.unwrap_or_default(),
            car.brand,
            car.make,
            claims.sub
        );
        Ok(car)
    }

    /// Apply the present fields of `patch`; everything else is left as stored
    pub async fn update(&self, id: Uuid, patch: CarPatch) -> Result<Car, CarError> {
        patch.validate().map_err(CarError::Invalid)?;

        if patch.is_empty() {
            return self.get(id).await;
        }

        self.cars
            .merge_update(id, patch.into_fields())
            .await?
            .ok_or(CarError::NotFound(id))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), CarError> {
        if self.cars.delete(id).await? {
            info!("Deleted car {}", id);
            Ok(())
        } else {
            Err(CarError::NotFound(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::{EnrichmentError, Enricher};
    use crate::database::{Collection, MemoryDocumentStore};
    use crate::media::{Transformation, UploadedImage};
    use async_trait::async_trait;
    use axum::body::Bytes;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const PICTURE_URL: &str = "https://res.cloudinary.com/demo/image/upload/FARM2/corolla.jpg";

    struct StubUploader {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaUploader for StubUploader {
        async fn upload(
            &self,
            _picture: Picture,
            options: &UploadOptions,
        ) -> Result<UploadedImage, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(options.folder, "FARM2");
            assert_eq!(options.transformation, Transformation::fill(800, 600));
            if self.fail {
                return Err(UploadError::Rejected {
                    status: 401,
                    message: "Invalid Signature".to_string(),
                });
            }
            Ok(UploadedImage {
                url: PICTURE_URL.to_string(),
                public_id: None,
            })
        }
    }

    struct Recording(mpsc::UnboundedSender<EnrichmentJob>);

    #[async_trait]
    impl Enricher for Recording {
        async fn enrich(&self, job: EnrichmentJob) -> Result<(), EnrichmentError> {
            let _ = self.0.send(job);
            Ok(())
        }
    }

    struct Fixture {
        service: CarService,
        store: Arc<MemoryDocumentStore>,
        auth: Arc<AuthHandler>,
        uploader: Arc<StubUploader>,
        jobs: mpsc::UnboundedReceiver<EnrichmentJob>,
    }

    fn fixture(upload_fails: bool) -> Fixture {
        let store = Arc::new(MemoryDocumentStore::new());
        let auth = Arc::new(AuthHandler::new("test-secret", 1).unwrap());
        let uploader = Arc::new(StubUploader {
            fail: upload_fails,
            calls: AtomicUsize::new(0),
        });
        let (seen, jobs) = mpsc::unbounded_channel();
        let (background, _worker) = BackgroundTasks::spawn(Arc::new(Recording(seen)));
        let options = UploadOptions {
            folder: "FARM2".to_string(),
            transformation: Transformation::fill(800, 600),
        };
        let service = CarService::new(
            store.clone(),
            auth.clone(),
            uploader.clone(),
            background,
            options,
        );
        Fixture {
            service,
            store,
            auth,
            uploader,
            jobs,
        }
    }

    async fn seed_user(fx: &Fixture) -> (Uuid, String) {
        let users: Repository<User> = Repository::new(fx.store.clone());
        let user = users
            .insert(
                User {
                    id: None,
                    username: "marko".to_string(),
                    email: "marko@example.com".to_string(),
                    password_hash: "$argon2id$stub".to_string(),
                    created_at: Utc::now(),
                },
                WriteRule::DoNothing,
            )
            .await
            .unwrap();
        let id = user.id.unwrap();
        (id, fx.auth.issue_token(id, "marko").unwrap())
    }

    fn corolla() -> NewCar {
        NewCar {
            brand: "Toyota".to_string(),
            make: "Corolla".to_string(),
            year: 2020,
            cm3: 1800,
            km: 500,
            price: 18000,
        }
    }

    fn picture() -> Picture {
        Picture {
            file_name: Some("corolla.jpg".to_string()),
            content_type: Some("image/jpeg".to_string()),
            data: Bytes::from_static(b"\xff\xd8\xff\xe0"),
        }
    }

    #[tokio::test]
    async fn create_links_owner_uses_upload_url_and_schedules_job() {
        let mut fx = fixture(false);
        let (user_id, token) = seed_user(&fx).await;

        let car = fx
            .service
            .create_with_picture(&token, corolla(), picture())
            .await
            .unwrap();

        assert!(car.id.is_some());
        assert_eq!(car.picture_url, PICTURE_URL);
        assert_eq!(car.user.id(), user_id);
        assert_eq!(fx.uploader.calls.load(Ordering::SeqCst), 1);

        let stored = fx.service.get(car.id.unwrap()).await.unwrap();
        assert_eq!(stored, car);

        let job = tokio::time::timeout(Duration::from_secs(2), fx.jobs.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            job,
            EnrichmentJob {
                brand: "Toyota".to_string(),
                make: "Corolla".to_string(),
                year: 2020,
                picture_url: PICTURE_URL.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn bad_credential_has_no_side_effects() {
        let fx = fixture(false);
        seed_user(&fx).await;

        let err = fx
            .service
            .create_with_picture("not-a-token", corolla(), picture())
            .await
            .unwrap_err();

        assert!(matches!(err, CarError::Auth(_)));
        assert_eq!(fx.uploader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.store.len(Collection::Cars).await, 0);
    }

    #[tokio::test]
    async fn failed_upload_persists_nothing() {
        let mut fx = fixture(true);
        let (_, token) = seed_user(&fx).await;

        let err = fx
            .service
            .create_with_picture(&token, corolla(), picture())
            .await
            .unwrap_err();

        assert!(matches!(err, CarError::Upload(_)));
        assert_eq!(fx.store.len(Collection::Cars).await, 0);
        assert!(fx.jobs.try_recv().is_err());
    }

    #[tokio::test]
    async fn deleted_owner_is_not_found_before_upload() {
        let fx = fixture(false);
        let token = fx.auth.issue_token(Uuid::new_v4(), "ghost").unwrap();

        let err = fx
            .service
            .create_with_picture(&token, corolla(), picture())
            .await
            .unwrap_err();

        assert!(matches!(err, CarError::OwnerNotFound(_)));
        assert_eq!(fx.uploader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.store.len(Collection::Cars).await, 0);
    }

    #[tokio::test]
    async fn out_of_range_fields_are_rejected_before_upload() {
        let fx = fixture(false);
        let (_, token) = seed_user(&fx).await;
        let car = NewCar {
            price: 0,
            ..corolla()
        };

        let err = fx
            .service
            .create_with_picture(&token, car, picture())
            .await
            .unwrap_err();

        assert!(matches!(err, CarError::Invalid(ref fields) if fields.contains_key("price")));
        assert_eq!(fx.uploader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let fx = fixture(false);
        let (_, token) = seed_user(&fx).await;
        let car = fx
            .service
            .create_with_picture(&token, corolla(), picture())
            .await
            .unwrap();
        let id = car.id.unwrap();

        let patch = CarPatch {
            price: Some(17000),
            ..CarPatch::default()
        };
        let updated = fx.service.update(id, patch).await.unwrap();

        assert_eq!(updated.price, 17000);
        assert_eq!(Car { price: 18000, ..updated.clone() }, car);
        assert_eq!(updated.picture_url, car.picture_url);
        assert_eq!(updated.user, car.user);

        let unchanged = fx.service.update(id, CarPatch::default()).await.unwrap();
        assert_eq!(unchanged, updated);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let fx = fixture(false);
        let id = Uuid::new_v4();

        assert!(matches!(fx.service.get(id).await, Err(CarError::NotFound(_))));
        assert!(matches!(fx.service.delete(id).await, Err(CarError::NotFound(_))));
        let patch = CarPatch {
            km: Some(10),
            ..CarPatch::default()
        };
        assert!(matches!(fx.service.update(id, patch).await, Err(CarError::NotFound(_))));
        assert!(matches!(
            fx.service.update(id, CarPatch::default()).await,
            Err(CarError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let fx = fixture(false);
        let (_, token) = seed_user(&fx).await;
        let car = fx
            .service
            .create_with_picture(&token, corolla(), picture())
            .await
            .unwrap();
        let id = car.id.unwrap();

        fx.service.delete(id).await.unwrap();
        assert!(matches!(fx.service.get(id).await, Err(CarError::NotFound(_))));
        assert!(matches!(fx.service.delete(id).await, Err(CarError::NotFound(_))));
        assert!(fx.service.list().await.unwrap().is_empty());
    }
}
