use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Drop a config template next to the build output
    let out_dir = env::var("OUT_DIR").unwrap_or_else(|_| "./".to_string());
    let template_path = Path::new(&out_dir).join("../../../tsreform.template.toml");

    let _ = fs::write(template_path, include_str!("src/tsreform.template.toml"));
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src/tsreform.template.toml");
}
