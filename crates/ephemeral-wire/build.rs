fn main() {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/events.proto"], &["proto"])
        .expect("failed to compile events.proto");
}
