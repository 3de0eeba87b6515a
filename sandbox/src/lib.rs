//! # Canopy Sandbox
//!
//! An in-memory remote store shaped like the Drive files API, for exercising
//! canopy plans end to end without a network.
//!
//! [`MemoryDrive`] keeps every item as the raw JSON file resource the real
//! service would return and decodes it through [`canopy_engine::decode`] on
//! the way out, so payload handling is exercised exactly as a networked
//! accessor would. Listings are paged, failures carry Drive-style error
//! bodies, and any call can be scripted to fail.
//!
//! ```rust
//! use canopy_engine::{AccessConfig, ItemId, Manager};
//! use canopy_sandbox::MemoryDrive;
//!
//! let drive = MemoryDrive::new(AccessConfig::new("token").unwrap());
//! drive.seed_folder("root", "Projects", None);
//! drive.seed_file("doc", "notes.txt", "text/plain", "root", b"hello");
//!
//! let mut manager = Manager::new(drive);
//! let planner = manager.open("root").unwrap();
//! let archive = planner.create_folder("Archive", &ItemId::remote("root")).unwrap();
//! planner.move_item(&ItemId::remote("doc"), &archive).unwrap();
//!
//! let result = manager.sync().unwrap();
//! assert!(result.is_success());
//! assert_eq!(manager.remote().names_in(result.remote_id_for(&archive).unwrap()), ["notes.txt"]);
//! ```

pub mod drive;

pub use drive::{Call, MemoryDrive, Method};
