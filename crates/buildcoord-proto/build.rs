fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().compile(&["proto/buildcoord.proto"], &["proto"])?;
    Ok(())
}
