/*
 * Copyright (C) 2023 The Android Open Source Project
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Tool for dumping and verifying APK Signing Blocks.

use anyhow::{bail, Result};
use apksigblock::{
    parse_apk, verify_scheme_block, ApkSections, BlockValue, Pair, SchemeBlock,
    SignatureAlgorithmID, Signer,
};
use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use openssl::hash::{hash, MessageDigest};
use serde_json::{json, Value};
use std::fs::File;
use std::path::PathBuf;

fn parse(args: &ArgMatches) -> Result<()> {
    let apk_path = args.get_one::<PathBuf>("apk").unwrap();
    let verbose = args.get_flag("verbose");
    let block = parse_apk(apk_path)?;

    let apk = File::open(apk_path)?;
    let mut sections = ApkSections::new(apk)?;

    if args.get_flag("json") {
        let pairs: Vec<Value> =
            block.pairs.iter().map(|p| pair_to_json(p, &mut sections)).collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&json!({ "pairs": pairs }))?);
        return Ok(());
    }

    for pair in &block.pairs {
        print!("PAIR ID {:#010x}", pair.id);
        if verbose {
            print!(" (length {})", pair.length);
        }
        println!();
        match &pair.value {
            BlockValue::Scheme(scheme) => dump_scheme_block(scheme, &mut sections, verbose)?,
            BlockValue::VerityPadding => println!("  VERITY PADDING BLOCK"),
            BlockValue::DependencyInfo(data) => {
                println!("  DEPENDENCY INFO BLOCK ({} bytes)", data.len())
            }
            BlockValue::GooglePlayFrosting(data) => {
                println!("  GOOGLE PLAY FROSTING BLOCK ({} bytes)", data.len())
            }
            BlockValue::Unknown(data) => println!("  UNKNOWN BLOCK ({} bytes)", data.len()),
        }
    }
    Ok(())
}

fn dump_scheme_block(
    scheme: &SchemeBlock,
    sections: &mut ApkSections<File>,
    verbose: bool,
) -> Result<()> {
    println!("  APK SIGNATURE SCHEME v{} BLOCK", scheme.version.number());
    for (i, signer) in scheme.signers.iter().enumerate() {
        println!("  SIGNER {}", i);
        dump_signer(signer, verbose)?;
    }
    match verify_scheme_block(scheme, sections) {
        Ok(()) => println!("  VERIFIED"),
        Err(e) => println!("  NOT VERIFIED ({})", e),
    }
    Ok(())
}

fn dump_signer(signer: &Signer, verbose: bool) -> Result<()> {
    let signed_data = &signer.signed_data;
    for digest in &signed_data.digests {
        println!("    DIGEST {}", algorithm_name(digest.signature_algorithm_id));
        if verbose {
            println!("      {}", hex::encode(&digest.digest));
        }
    }
    for certificate in &signed_data.certificates {
        let fingerprint = hash(MessageDigest::sha256(), &certificate.der)?;
        println!("    CERTIFICATE SHA-256 {}", hex::encode(fingerprint));
    }
    if let (Some(min), Some(max)) = (signer.min_sdk, signer.max_sdk) {
        println!("    SDK VERSIONS {}..{}", min, max);
    }
    for attribute in &signed_data.additional_attributes {
        let kind = if attribute.is_stripping_protection() {
            " (stripping protection)"
        } else if attribute.is_proof_of_rotation() {
            " (proof of rotation)"
        } else {
            ""
        };
        println!("    ATTRIBUTE {:#010x}{} ({} bytes)", attribute.id, kind, attribute.value.len());
    }
    for signature in &signer.signatures {
        println!("    SIGNATURE {}", algorithm_name(signature.signature_algorithm_id));
        if verbose {
            println!("      {}", hex::encode(&signature.signature));
        }
    }
    let fingerprint = hash(MessageDigest::sha256(), &signer.public_key.der)?;
    println!("    PUBLIC KEY SHA-256 {}", hex::encode(fingerprint));
    Ok(())
}

fn algorithm_name(id: u32) -> String {
    match SignatureAlgorithmID::from_id(id) {
        Some(algorithm) => format!("{:#06x} {}", id, algorithm.name()),
        None => format!("{:#06x} (unknown)", id),
    }
}

fn pair_to_json(pair: &Pair, sections: &mut ApkSections<File>) -> Result<Value> {
    let value = match &pair.value {
        BlockValue::Scheme(scheme) => {
            let verified = verify_scheme_block(scheme, sections).is_ok();
            json!({
                "type": "signature_scheme",
                "version": scheme.version.number(),
                "signers": scheme.signers.iter().map(signer_to_json).collect::<Result<Vec<_>>>()?,
                "verified": verified,
            })
        }
        BlockValue::VerityPadding => json!({ "type": "verity_padding" }),
        BlockValue::DependencyInfo(data) => {
            json!({ "type": "dependency_info", "value": hex::encode(data) })
        }
        BlockValue::GooglePlayFrosting(data) => {
            json!({ "type": "google_play_frosting", "value": hex::encode(data) })
        }
        BlockValue::Unknown(data) => json!({ "type": "unknown", "value": hex::encode(data) }),
    };
    Ok(json!({ "id": format!("{:#010x}", pair.id), "length": pair.length, "value": value }))
}

fn signer_to_json(signer: &Signer) -> Result<Value> {
    let signed_data = &signer.signed_data;
    Ok(json!({
        "digests": signed_data.digests.iter().map(|d| json!({
            "algorithm_id": format!("{:#06x}", d.signature_algorithm_id),
            "digest": hex::encode(&d.digest),
        })).collect::<Vec<_>>(),
        "certificates": signed_data.certificates.iter().map(|c| hex::encode(&c.der)).collect::<Vec<_>>(),
        "min_sdk": signer.min_sdk,
        "max_sdk": signer.max_sdk,
        "additional_attributes": signed_data.additional_attributes.iter().map(|a| json!({
            "id": format!("{:#010x}", a.id),
            "value": hex::encode(&a.value),
        })).collect::<Vec<_>>(),
        "signatures": signer.signatures.iter().map(|s| json!({
            "algorithm_id": format!("{:#06x}", s.signature_algorithm_id),
            "signature": hex::encode(&s.signature),
        })).collect::<Vec<_>>(),
        "public_key": hex::encode(&signer.public_key.der),
    }))
}

fn verify(args: &ArgMatches) -> Result<()> {
    let apk_path = args.get_one::<PathBuf>("apk").unwrap();
    let results = apksigblock::verify_apk(apk_path)?;
    let mut verified_blocks = 0;
    let mut failed_blocks = 0;
    let block = parse_apk(apk_path)?;
    for ((id, outcome), pair) in results.iter().zip(block.pairs.iter()) {
        if let (Some(ok), BlockValue::Scheme(scheme)) = (outcome, &pair.value) {
            if *ok {
                println!("v{} verified ({:#010x})", scheme.version.number(), id);
                verified_blocks += 1;
            } else {
                println!("v{} not verified ({:#010x})", scheme.version.number(), id);
                failed_blocks += 1;
            }
        }
    }
    if verified_blocks == 0 || failed_blocks > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn clap_command() -> Command {
    Command::new("apksigblock")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("parse")
                .about("Dump the APK Signing Block of an APK")
                .arg_required_else_help(true)
                .arg(Arg::new("apk").value_parser(ValueParser::path_buf()).required(true))
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue))
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Verify the signature scheme blocks of an APK")
                .arg_required_else_help(true)
                .arg(Arg::new("apk").value_parser(ValueParser::path_buf()).required(true)),
        )
}

fn main() -> Result<()> {
    env_logger::init();
    let args = clap_command().get_matches();
    match args.subcommand() {
        Some(("parse", sub_args)) => parse(sub_args)?,
        Some(("verify", sub_args)) => verify(sub_args)?,
        _ => bail!("Invalid arguments"),
    }
    Ok(())
}
