fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the provider protocol (tfplugin5.1)
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/tfplugin5.proto"], &["proto"])?;

    // Re-run if proto files change
    println!("cargo:rerun-if-changed=proto/tfplugin5.proto");

    Ok(())
}
