//! 构建脚本
//!
//! 使用 tonic-build 编译 `proto/prx.proto`，生成 gRPC 服务端与客户端代码。

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        // prxctl 与集成测试使用生成的客户端
        .build_client(true)
        .compile_protos(&["proto/prx.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/prx.proto");

    Ok(())
}
