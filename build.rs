//! # Build Script
//!
//! Embeds the Windows Application Manifest (`app.manifest`) into the executable.
//!
//! The manifest controls:
//! - DPI Awareness (High DPI support).
//! - User Account Control (UAC) behavior. We ask for `asInvoker` and elevate ourselves
//!   at runtime, so the argument checks stay visible to the caller's console.
//! - Windows Version Compatibility (identifying as Win10/11 compatible).

fn main() {
    println!("cargo:rerun-if-changed=app.manifest");
    // If embedding fails the binary still builds, just without the manifest.
    let _ = embed_resource::compile("app.manifest", embed_resource::NONE);
}
