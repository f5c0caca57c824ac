fn main() -> std::io::Result<()> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["proto/deviceplugin/v1beta1/api.proto"],
            &["proto/deviceplugin"],
        )?;

    Ok(())
}
