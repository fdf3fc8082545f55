fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only the server side is needed by the driver
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/csi.proto"], &["proto"])?;

    Ok(())
}
