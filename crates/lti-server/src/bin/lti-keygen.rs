//! Generate an RSA keypair for the tool.
//!
//! Prints the PKCS#8 private key (for `TOOL_PRIVATE_KEY`), the public key and
//! the JWKS document platforms can be pointed at.

use lti_shared::keys::generate_keypair;

fn main() -> anyhow::Result<()> {
    let keys = generate_keypair()?;

    println!("# kid: {}", keys.kid);
    println!();
    print!("{}", keys.private_pem);
    println!();
    print!("{}", keys.public_pem);
    println!();
    println!("{}", serde_json::to_string_pretty(&keys.jwks)?);

    Ok(())
}
