fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile the CSI Identity and Controller services
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/csi.proto"], &["proto"])?;

    Ok(())
}
