use rideline_shared::models::{Driver, PackageClass};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::profile::driver_profile;

/// Drivers currently available for offers. One lock guards every read and write.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Mutex<Vec<Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a driver with a generated profile. Registering an id that is
    /// already present replaces the old entry.
    pub async fn register(&self, driver_id: &str, package_class: PackageClass) -> Driver {
        let driver = driver_profile(driver_id, package_class);

        let mut drivers = self.drivers.lock().await;
        drivers.retain(|d| d.id != driver_id);
        drivers.push(driver.clone());

        info!(
            "Registered driver {} ({}) in cell {}; {} available",
            driver.id,
            package_class,
            driver.geocell,
            drivers.len()
        );
        driver
    }

    /// Remove a driver. Returns whether anything was removed; unknown ids are a no-op.
    pub async fn unregister(&self, driver_id: &str) -> bool {
        let mut drivers = self.drivers.lock().await;
        let before = drivers.len();
        drivers.retain(|d| d.id != driver_id);

        let removed = drivers.len() < before;
        if removed {
            info!("Unregistered driver {}; {} available", driver_id, drivers.len());
        } else {
            debug!("Unregister for unknown driver {}", driver_id);
        }
        removed
    }

    /// Ids of drivers serving `package_class`, in registration order.
    pub async fn find_available(&self, package_class: PackageClass) -> Vec<String> {
        self.drivers
            .lock()
            .await
            .iter()
            .filter(|d| d.package_class == package_class)
            .map(|d| d.id.clone())
            .collect()
    }

    pub async fn list(&self, package_class: Option<PackageClass>) -> Vec<Driver> {
        self.drivers
            .lock()
            .await
            .iter()
            .filter(|d| package_class.map_or(true, |class| d.package_class == class))
            .cloned()
            .collect()
    }

    pub async fn get(&self, driver_id: &str) -> Option<Driver> {
        self.drivers
            .lock()
            .await
            .iter()
            .find(|d| d.id == driver_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.drivers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_find() {
        let registry = DriverRegistry::new();
        registry.register("d1", PackageClass::Sedan).await;
        registry.register("d2", PackageClass::Van).await;
        registry.register("d3", PackageClass::Sedan).await;

        assert_eq!(registry.find_available(PackageClass::Sedan).await, vec!["d1", "d3"]);
        assert_eq!(registry.find_available(PackageClass::Van).await, vec!["d2"]);
        assert!(registry.find_available(PackageClass::Luxury).await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = DriverRegistry::new();
        registry.register("d1", PackageClass::Sedan).await;

        assert!(registry.unregister("d1").await);
        assert!(!registry.unregister("d1").await);
        assert!(!registry.unregister("never-registered").await);
        assert!(registry.find_available(PackageClass::Sedan).await.is_empty());
        assert!(registry.get("d1").await.is_none());
    }

    #[tokio::test]
    async fn test_reregister_replaces() {
        let registry = DriverRegistry::new();
        registry.register("d1", PackageClass::Sedan).await;
        registry.register("d1", PackageClass::Suv).await;

        assert_eq!(registry.len().await, 1);
        assert!(registry.find_available(PackageClass::Sedan).await.is_empty());
        assert_eq!(registry.get("d1").await.unwrap().package_class, PackageClass::Suv);
    }

    #[tokio::test]
    async fn test_list_filters_by_class() {
        let registry = DriverRegistry::new();
        registry.register("d1", PackageClass::Sedan).await;
        registry.register("d2", PackageClass::Luxury).await;

        assert_eq!(registry.list(None).await.len(), 2);
        let luxury = registry.list(Some(PackageClass::Luxury)).await;
        assert_eq!(luxury.len(), 1);
        assert_eq!(luxury[0].id, "d2");
    }
}
