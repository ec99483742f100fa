//! Persisted state and the rendered static site.
//!
//! # Submodules
//!
//! - [`json`]: Reads and writes the catalog and feed source documents
//! - [`site`]: Renders the HTML pages and copies image assets
//! - [`atom`]: Writes the Atom feed of upcoming screenings
//!
//! # Output Structure
//!
//! ```text
//! data/
//! ├── movies.json
//! └── sources.json
//!
//! _site/
//! ├── index.html
//! ├── archivio.html
//! ├── feed.xml
//! └── images/
//! ```

pub mod atom;
pub mod json;
pub mod site;
