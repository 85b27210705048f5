//! # sitepipe
//!
//! A front-end build pipeline in a single binary. It turns a `src/` tree into
//! a development build (`dev/`) or a production build (`dist/`), serves the
//! result with live reload, and deploys it over FTP.
//!
//! # Architecture: Named Tasks Over One Context
//!
//! The pipeline is a flat set of named tasks (see [`runner`]). Each build task
//! reads `src/`, writes under the target's output root, and knows nothing of
//! the others:
//!
//! ```text
//! media    assets/media/**, screenshot.png  →  compressed images, copied media
//! scripts  assets/scripts/**                →  vendor/critical/modern/legacy.js
//! styles   assets/styles/*.scss             →  prefixed CSS
//! html     everything else                  →  templated pages
//! ```
//!
//! `default` runs the four concurrently, `ftp` uploads the result, `sync`
//! serves it and `watch` reruns `default` on every change.
//!
//! # Dev vs. Dist
//!
//! The [`target::Target`] chosen by `--dist` decides every branch: dev builds
//! skip inputs whose outputs are newer ([`freshness`]) and keep source maps;
//! dist builds clean, rebuild everything and minify.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`runner`] | Task names, dependency sequence, notifications, watch loop |
//! | [`tasks`] | The build and deploy tasks plus their shared context |
//! | [`sources`] | Ordered glob expansion with `!` negation |
//! | [`freshness`] | The dev-only "newer than output" filter |
//! | [`template`] | `@@include` / `@@variable` HTML templating |
//! | [`javascript`] | Lint, transpile, concatenate and minify via `oxc` |
//! | [`imaging`] | Image compression backend (trait + pure-Rust implementation) |
//! | [`ledger`] | Content hashes of uploaded files, for incremental FTP deploys |
//! | [`server`] | Static/proxy dev server with live reload |
//! | [`watch`] | Debounced filesystem watcher |
//! | [`config`] | `config.json`: FTP credentials and dev server options, prompted on demand |
//! | [`settings`] | `sitepipe.toml`: layout, browsers, quality, parallelism |
//! | [`project`] | `package.json` metadata exposed to templates |
//! | [`notifier`] | Desktop notifications and the shared error handler |
//! | [`target`] | Dev/dist selection and the directory layout |
//! | [`output`] | CLI output formatting |

pub mod config;
pub mod freshness;
pub mod imaging;
pub mod javascript;
pub mod ledger;
pub mod notifier;
pub mod output;
pub mod project;
pub mod runner;
pub mod server;
pub mod settings;
pub mod sources;
pub mod target;
pub mod tasks;
pub mod template;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
