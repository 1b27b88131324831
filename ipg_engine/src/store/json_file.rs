//! [`OrderStore`] backed by one JSON file per day (`history_YYYYMMDD.json`) in a results directory.
//!
//! Each partition has its own async read/write lock. Mutations hold the write lock for one read-modify-write cycle and
//! replace the file atomically: the new snapshot is written to a temporary file in the same directory, synced, and
//! renamed over the old one. A crash at any point leaves either the old or the new snapshot on disk, plus at worst a
//! stray temporary file that is ignored.
use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Duration, Utc};
use log::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, RwLock};

use super::{legacy::parse_partition, OrderStore, StoreError};
use crate::{
    db_types::{DayStamp, InvoiceOrder, LocalId, NewInvoice, OrderStatus, StatusChange, StatusUpdate},
    state_machine::{apply, evaluate, NoOpReason, Transition},
};

const FILE_PATTERN: &str = r"^history_(\d{8})\.json$";

/// The on-disk shape of a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionDocument {
    pub day: DayStamp,
    pub items: Vec<InvoiceOrder>,
}

pub struct JsonFileStore {
    root: PathBuf,
    file_pattern: Regex,
    locks: Mutex<HashMap<DayStamp, Arc<RwLock<()>>>>,
    // Serialises attach_remote so that the uniqueness check and the write happen as one step
    attach_guard: AsyncMutex<()>,
    last_created: Mutex<DateTime<Utc>>,
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JsonFileStore({})", self.root.display())
    }
}

impl JsonFileStore {
    /// Opens (creating if necessary) the store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .map_err(|e| StoreError::Io(format!("Cannot create results directory {}. {e}", root.display())))?;
        let file_pattern = Regex::new(FILE_PATTERN).map_err(|e| StoreError::Io(e.to_string()))?;
        info!("🗃️ History store opened at {}", root.display());
        Ok(Self {
            root,
            file_pattern,
            locks: Mutex::new(HashMap::new()),
            attach_guard: AsyncMutex::new(()),
            last_created: Mutex::new(DateTime::<Utc>::MIN_UTC),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_path(&self, day: &DayStamp) -> PathBuf {
        self.root.join(format!("history_{day}.json"))
    }

    fn lock_for(&self, day: &DayStamp) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(day.clone()).or_default())
    }

    // Wall-clock time, nudged forward if the clock has not moved (or moved backwards) since the last record.
    fn next_created_at(&self) -> DateTime<Utc> {
        let mut last = self.last_created.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let ts = if now > *last { now } else { *last + Duration::microseconds(1) };
        *last = ts;
        ts
    }

    /// Reads a partition without locking. `None` if the file does not exist.
    async fn read_items(&self, day: &DayStamp) -> Result<Option<Vec<InvoiceOrder>>, StoreError> {
        let path = self.partition_path(day);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(format!("Cannot read {}. {e}", path.display()))),
        };
        parse_partition(day, &bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt { day: day.clone(), message: e.to_string() })
    }

    /// Atomically replaces a partition file. The caller must hold the partition's write lock.
    async fn write_items(&self, day: &DayStamp, items: Vec<InvoiceOrder>) -> Result<(), StoreError> {
        let doc = PartitionDocument { day: day.clone(), items };
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| StoreError::Io(e.to_string()))?;
        let root = self.root.clone();
        let path = self.partition_path(day);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::Builder::new().prefix(".history_").suffix(".tmp").tempfile_in(&root)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io(format!("Partition writer task failed. {e}")))??;
        trace!("🗃️ Partition {day} written");
        Ok(())
    }

    async fn find_in_partition(&self, day: &DayStamp, local_id: &LocalId) -> Result<Option<InvoiceOrder>, StoreError> {
        let lock = self.lock_for(day);
        let _guard = lock.read().await;
        let items = self.read_items(day).await?.unwrap_or_default();
        Ok(items.into_iter().find(|o| &o.local_id == local_id))
    }

    /// Finds the partition holding `local_id`: the one named in the id first, then every partition (older ids do
    /// not carry their day).
    async fn locate(&self, local_id: &LocalId) -> Result<Option<(DayStamp, InvoiceOrder)>, StoreError> {
        let hint = local_id.day_hint();
        if let Some(day) = &hint {
            if let Some(order) = self.find_in_partition(day, local_id).await? {
                return Ok(Some((day.clone(), order)));
            }
        }
        for day in self.list_partitions().await? {
            if Some(&day) == hint.as_ref() {
                continue;
            }
            if let Some(order) = self.find_in_partition(&day, local_id).await? {
                return Ok(Some((day, order)));
            }
        }
        Ok(None)
    }

    /// Runs one read-modify-write cycle on a record under the partition's write lock. `f` returns its result and
    /// whether the partition must be written back.
    async fn mutate<T, F>(&self, day: &DayStamp, local_id: &LocalId, f: F) -> Result<T, StoreError>
    where F: FnOnce(&mut InvoiceOrder) -> Result<(T, bool), StoreError> {
        let lock = self.lock_for(day);
        let _guard = lock.write().await;
        let mut items = self.read_items(day).await?.ok_or_else(|| StoreError::NotFound(local_id.clone()))?;
        let order = items
            .iter_mut()
            .find(|o| &o.local_id == local_id)
            .ok_or_else(|| StoreError::NotFound(local_id.clone()))?;
        let (result, dirty) = f(order)?;
        if dirty {
            self.write_items(day, items).await?;
        }
        Ok(result)
    }
}

impl OrderStore for JsonFileStore {
    async fn create(&self, invoice: NewInvoice) -> Result<InvoiceOrder, StoreError> {
        let created_at = self.next_created_at();
        let day = DayStamp::from_datetime(&created_at);
        let lock = self.lock_for(&day);
        let _guard = lock.write().await;
        let mut items = self.read_items(&day).await?.unwrap_or_default();
        let mut local_id = LocalId::generate(&day);
        while items.iter().any(|o| o.local_id == local_id) {
            local_id = LocalId::generate(&day);
        }
        let order = InvoiceOrder::new_draft(local_id, created_at, invoice);
        items.push(order.clone());
        self.write_items(&day, items).await?;
        debug!("🗃️ New record {order}");
        Ok(order)
    }

    async fn attach_remote(
        &self,
        local_id: &LocalId,
        paypal_order_id: &str,
        approval_url: &str,
    ) -> Result<InvoiceOrder, StoreError> {
        let _attach = self.attach_guard.lock().await;
        if let Some(holder) = self.find_by_remote(paypal_order_id).await? {
            if &holder.local_id != local_id {
                warn!(
                    "🗃️ PayPal order {paypal_order_id} is already attached to {}. Refusing to attach it to {local_id}.",
                    holder.local_id
                );
                return Err(StoreError::DuplicateRemote {
                    paypal_order_id: paypal_order_id.to_string(),
                    holder: holder.local_id,
                });
            }
        }
        let (day, _) = self.locate(local_id).await?.ok_or_else(|| StoreError::NotFound(local_id.clone()))?;
        let order = self
            .mutate(&day, local_id, |order| {
                if order.status != OrderStatus::Draft {
                    return Err(StoreError::StateViolation {
                        local_id: order.local_id.clone(),
                        status: order.status,
                        message: "Only DRAFT records can be attached to a PayPal order".to_string(),
                    });
                }
                order.paypal_order_id = Some(paypal_order_id.to_string());
                order.approval_url = Some(approval_url.to_string());
                order.status = OrderStatus::Issued;
                order.last_status_at = Utc::now();
                Ok((order.clone(), true))
            })
            .await?;
        debug!("🗃️ Record {local_id} is now linked to PayPal order {paypal_order_id}");
        Ok(order)
    }

    async fn update_status(&self, local_id: &LocalId, update: StatusUpdate) -> Result<StatusChange, StoreError> {
        let (day, _) = self.locate(local_id).await?.ok_or_else(|| StoreError::NotFound(local_id.clone()))?;
        self.mutate(&day, local_id, |order| {
            let previous = order.status;
            match evaluate(order, &update) {
                Ok(Transition::Apply) => {
                    apply(order, &update, Utc::now());
                    debug!("🗃️ Record {local_id}: {previous} → {}", order.status);
                    Ok((StatusChange { changed: true, previous, order: order.clone() }, true))
                },
                Ok(Transition::NoOp(reason)) => {
                    match reason {
                        NoOpReason::NotAllowed => {
                            info!("🗃️ Record {local_id}: ignoring disallowed move {previous} → {}", update.status)
                        },
                        NoOpReason::Stale => {
                            debug!("🗃️ Record {local_id}: ignoring stale observation of {}", update.status)
                        },
                        NoOpReason::DuplicateEvent => {
                            debug!("🗃️ Record {local_id}: event {:?} was already applied", update.event_id)
                        },
                        NoOpReason::Unchanged => trace!("🗃️ Record {local_id} is already {previous}"),
                    }
                    Ok((StatusChange { changed: false, previous, order: order.clone() }, false))
                },
                Err(e) => {
                    warn!("🗃️ Record {local_id}: rejected transition. {e}");
                    Err(StoreError::violation(order, e))
                },
            }
        })
        .await
    }

    async fn fetch(&self, local_id: &LocalId) -> Result<Option<InvoiceOrder>, StoreError> {
        Ok(self.locate(local_id).await?.map(|(_, order)| order))
    }

    async fn list_partition(&self, day: &DayStamp) -> Result<Vec<InvoiceOrder>, StoreError> {
        let lock = self.lock_for(day);
        let _guard = lock.read().await;
        Ok(self.read_items(day).await?.unwrap_or_default())
    }

    async fn list_partitions(&self) -> Result<Vec<DayStamp>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut days = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let day = self.file_pattern.captures(name).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse().ok());
            if let Some(day) = day {
                days.push(day);
            }
        }
        days.sort();
        Ok(days)
    }

    async fn delete_partition(&self, day: &DayStamp) -> Result<Vec<InvoiceOrder>, StoreError> {
        let lock = self.lock_for(day);
        let _guard = lock.write().await;
        let items = self.read_items(day).await?.ok_or_else(|| StoreError::PartitionNotFound(day.clone()))?;
        match tokio::fs::remove_file(self.partition_path(day)).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StoreError::PartitionNotFound(day.clone())),
            Err(e) => return Err(e.into()),
        }
        info!("🗃️ Partition {day} deleted ({} records)", items.len());
        Ok(items)
    }

    async fn find_by_remote(&self, paypal_order_id: &str) -> Result<Option<InvoiceOrder>, StoreError> {
        for day in self.list_partitions().await? {
            let found = self
                .list_partition(&day)
                .await?
                .into_iter()
                .find(|o| o.paypal_order_id.as_deref() == Some(paypal_order_id));
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}
