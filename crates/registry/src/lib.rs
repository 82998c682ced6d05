//! # chatvault-registry
//!
//! Anbindung an den externen Schluessel-Sync-Dienst.
//!
//! ## Module
//! - `registry` - `KeyRegistry`-Trait, `MemoryRegistry`, Preconditions, Aenderungs-Events
//! - `sync` - `KeyRegistrySync`, typisierter Client fuer Gruppen und oeffentliche Schluessel
//! - `records` - Datensaetze (`GroupKeyRecord`, `MemberEntry`, `PublicKeyRecord`)
//! - `paths` - Pfad-Layout

pub mod error;
pub mod paths;
pub mod records;
pub mod registry;
pub mod sync;

pub use error::{RegistryError, RegistryResult};
pub use records::{GroupKeyRecord, MemberEntry, PublicKeyRecord, RecordMetadata};
pub use registry::{KeyRegistry, MemoryRegistry, Precondition, RegistryChange};
pub use sync::KeyRegistrySync;
