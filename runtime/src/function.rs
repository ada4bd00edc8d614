//! Execution of Function blocks.
//!
//! The input template is fanned out, the function is applied to every
//! expanded input, and the outputs are bound as one Single or List cell.
//! Any error aborts the block and propagates to the caller.

use std::thread;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use blockscript::block::{Function, FunctionBlock, KdfSalt};
use blockscript::keyword::Keyword;
use rand::{Rng, RngCore};
use regex::Regex;
use tracing::{debug, warn};

use crate::compute;
use crate::context::ExecutionContext;
use crate::crypto::MAX_KDF_BYTES;
use crate::dates;
use crate::error::RuntimeError;
use crate::substitution::has_fan_out_marker;
use crate::text;
use crate::user_agent;
use crate::variables::CVarValue;

/// Delay checks for cancellation this often.
const DELAY_SLICE: Duration = Duration::from_millis(25);

pub fn execute_function(block: &FunctionBlock, ctx: &mut ExecutionContext) -> Result<(), RuntimeError> {
    let name = block.function.kind().name();
    let inputs = ctx.substitute_all(&block.input);
    let mut outputs = Vec::with_capacity(inputs.len());

    for input in &inputs {
        let output = apply(&block.function, input, ctx)?;
        debug!(function = name, input = %input, output = %output, "function executed");
        ctx.log.info(format!(
            "Executed function {} on input {} with outcome {}",
            name, input, output
        ));
        outputs.push(output);
    }

    let value = if outputs.len() > 1 || has_fan_out_marker(&block.input) {
        CVarValue::List(outputs)
    } else {
        CVarValue::Single(outputs.pop().unwrap_or_default())
    };
    ctx.bind_output(block.output.as_ref(), value);
    Ok(())
}

/// Apply `function` to one expanded input.
pub fn apply(function: &Function, input: &str, ctx: &mut ExecutionContext) -> Result<String, RuntimeError> {
    let output = match function {
        Function::Constant => input.to_string(),

        Function::Base64Encode => STANDARD.encode(input),
        Function::Base64Decode => {
            let bytes = STANDARD
                .decode(input.trim())
                .map_err(|e| RuntimeError::Encoding(format!("invalid base64: {}", e)))?;
            String::from_utf8_lossy(&bytes).into_owned()
        }

        Function::Hash { algorithm } => ctx.crypto.digest(input, *algorithm)?,
        Function::Hmac { algorithm, key, base64 } => {
            let key = ctx.substitute(key);
            ctx.crypto.hmac(input, *algorithm, &key, *base64)?
        }

        Function::Translate {
            stop_after_first_match,
            dictionary,
        } => text::translate(input, dictionary, *stop_after_first_match),

        Function::DateToUnixTime { format } => {
            let format = ctx.substitute(format);
            dates::date_to_unix(input, &format)?.to_string()
        }

        Function::Length => input.chars().count().to_string(),
        Function::ToLowercase => input.to_lowercase(),
        Function::ToUppercase => input.to_uppercase(),
        Function::Trim => input.trim().to_string(),
        Function::ReverseString => input.chars().rev().collect(),

        Function::Replace { what, with, use_regex } => {
            let what = ctx.substitute(what);
            let with = ctx.substitute(with);
            if *use_regex {
                Regex::new(&what)?.replace_all(input, with.as_str()).into_owned()
            } else if what.is_empty() {
                return Err(RuntimeError::custom("Replace needs a non-empty string to replace"));
            } else {
                input.replace(&what, &with)
            }
        }

        Function::RegexMatch { pattern } => {
            let pattern = ctx.substitute(pattern);
            Regex::new(&pattern)?
                .find(input)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        }

        Function::UrlEncode => text::chunks(input, ctx.settings.url_encode_chunk)
            .iter()
            .map(|chunk| urlencoding::encode(chunk))
            .collect(),
        Function::UrlDecode => urlencoding::decode(input)
            .map_err(|e| RuntimeError::Encoding(e.to_string()))?
            .into_owned(),

        Function::Unescape => text::unescape(input)?,
        Function::HtmlEntityEncode => text::html_encode(input),
        Function::HtmlEntityDecode => text::html_decode(input),

        Function::UnixTimeToDate => dates::unix_to_date(input)?,
        Function::CurrentUnixTime => dates::current_unix_time().to_string(),
        Function::UnixTimeToIso8601 => dates::unix_to_iso8601(input)?,

        Function::RandomNum { min, max } => random_num(*min, *max, ctx)?.to_string(),
        Function::RandomString => text::random_string(input, &mut ctx.rng),
        Function::GetRandomUa => user_agent::random_user_agent(&mut ctx.rng),

        Function::Ceil => text::format_number(text::parse_decimal(input)?.ceil()),
        Function::Floor => text::format_number(text::parse_decimal(input)?.floor()),
        Function::Round => text::format_number(text::parse_decimal(input)?.round()),
        Function::Compute => compute::evaluate(input)?.to_string(),

        Function::CountOccurrences { needle } => {
            let needle = ctx.substitute(needle);
            text::count_occurrences(input, &needle)?.to_string()
        }

        Function::CharAt { index } => {
            let index = text::parse_int(&ctx.substitute(index))?;
            text::char_at(input, index)?
        }
        Function::Substring { index, length } => {
            let index = text::parse_int(&ctx.substitute(index))?;
            let length = text::parse_int(&ctx.substitute(length))?;
            text::substring(input, index, length)?
        }

        Function::ClearCookies => {
            ctx.cookies.clear();
            String::new()
        }

        Function::Delay => {
            delay(input, ctx);
            String::new()
        }

        Function::RsaEncrypt(params) => {
            let (key, modulus, exponent) = (
                ctx.substitute(&params.key),
                ctx.substitute(&params.modulus),
                ctx.substitute(&params.exponent),
            );
            ctx.crypto.rsa_encrypt(input, &key, &modulus, &exponent, params.oaep)?
        }
        Function::RsaDecrypt(params) => {
            let (key, modulus, exponent) = (
                ctx.substitute(&params.key),
                ctx.substitute(&params.modulus),
                ctx.substitute(&params.exponent),
            );
            ctx.crypto.rsa_decrypt(input, &key, &modulus, &exponent, params.oaep)?
        }

        Function::AesEncrypt(params) => {
            let (key, iv) = (ctx.substitute(&params.key), ctx.substitute(&params.iv));
            ctx.crypto.aes_encrypt(input, &key, &iv, params.mode, params.padding)?
        }
        Function::AesDecrypt(params) => {
            let (key, iv) = (ctx.substitute(&params.key), ctx.substitute(&params.iv));
            ctx.crypto.aes_decrypt(input, &key, &iv, params.mode, params.padding)?
        }

        Function::Pbkdf2Pkcs5 {
            salt,
            iterations,
            key_size,
            algorithm,
        } => {
            let salt = match salt {
                KdfSalt::Fixed(text) => STANDARD
                    .decode(ctx.substitute(text).trim())
                    .map_err(|e| RuntimeError::Encoding(format!("salt is not valid base64: {}", e)))?,
                KdfSalt::Random(size) => {
                    let size = *size as usize;
                    if size > MAX_KDF_BYTES {
                        return Err(RuntimeError::Crypto(format!(
                            "PBKDF2 salt size {} exceeds {} bytes",
                            size, MAX_KDF_BYTES
                        )));
                    }
                    let mut bytes = vec![0u8; size];
                    ctx.rng.fill_bytes(&mut bytes);
                    bytes
                }
            };
            ctx.crypto
                .kdf(input, &salt, *iterations, *key_size as usize, *algorithm)?
        }
    };
    Ok(output)
}

/// Uniform in `[min, max)`.
fn random_num(min: i64, max: i64, ctx: &mut ExecutionContext) -> Result<i64, RuntimeError> {
    if min > max {
        return Err(RuntimeError::custom(format!(
            "RandomNum minimum {} is greater than maximum {}",
            min, max
        )));
    }
    if min == max {
        return Ok(min);
    }
    Ok(ctx.rng.gen_range(min..max))
}

/// Sleep for `input` milliseconds. Unreadable input is ignored.
///
/// A duration too long to represent sleeps until cancelled.
fn delay(input: &str, ctx: &mut ExecutionContext) {
    let Ok(millis) = input.trim().parse::<u64>() else {
        warn!(input = %input, "ignoring Delay with a malformed duration");
        ctx.log.warn(format!("Ignored Delay with malformed duration {}", input));
        return;
    };

    let deadline = Instant::now().checked_add(Duration::from_millis(millis));
    loop {
        if ctx.cancel.is_cancelled() {
            debug!("delay cancelled");
            return;
        }
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return;
                }
                DELAY_SLICE.min(deadline - now)
            }
            None => DELAY_SLICE,
        };
        thread::sleep(slice);
    }
}
