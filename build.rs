const PROTO_ROOT: &str = "proto";
const PROTOS: [&str; 2] = [
    "envoy/service/discovery/v2/sds.proto",
    "envoy/api/v2/auth/secret.proto",
];

fn main() -> Result<(), anyhow::Error> {
    println!("cargo:rerun-if-changed={PROTO_ROOT}");

    // protox resolves the google/protobuf well-known types itself, so no
    // system protoc is needed.
    let file_descriptors = protox::compile(PROTOS, [PROTO_ROOT])?;
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_fds(file_descriptors)?;

    Ok(())
}
