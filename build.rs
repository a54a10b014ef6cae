fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=Cargo.toml");

    // Version and build time for `imagedupe::built_info`
    built::write_built_file().expect("Failed to acquire build-time information");
}
