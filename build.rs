use std::io::Result;

fn main() -> Result<()> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path().unwrap());
    }
    prost_build::compile_protos(&["src/geo/geodat.proto"], &["src/geo/"])?;
    Ok(())
}
