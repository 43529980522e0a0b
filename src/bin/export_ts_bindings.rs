use std::path::Path;

fn main() {
    let out_dir = Path::new("ui/src/generated");
    if let Err(err) = lectora_core::snapshot::export_ts_bindings(out_dir) {
        eprintln!("failed to export reading snapshot bindings: {err:#}");
        std::process::exit(1);
    }
    println!("exported reading snapshot bindings to {}", out_dir.display());
}
