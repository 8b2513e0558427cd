//! Small synthetic documents for tests across the workspace.

use lopdf::encryption::crypt_filters::{Aes128CryptFilter, Aes256CryptFilter, CryptFilter};
use lopdf::{
    dictionary, Document, EncryptionState, EncryptionVersion, Object, ObjectId, Permissions, Stream,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Security handlers [`encrypted_pdf`] can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    /// RC4, 40-bit key (`/V 1 /R 2`).
    Rc4V1,
    /// RC4, 128-bit key (`/V 2 /R 3`).
    Rc4V2,
    /// AES-128 crypt filters (`/V 4 /R 4`).
    Aes128,
    /// AES-256 crypt filters (`/V 5 /R 6`).
    Aes256,
}

const STD_CF: &[u8] = b"StdCF";
const FILE_KEY: [u8; 32] = [7; 32];

fn media_box(width: f32, height: f32) -> Object {
    vec![0.into(), 0.into(), width.into(), height.into()].into()
}

fn build(mut doc: Document, pages_id: ObjectId, kids: Vec<Object>, extra: lopdf::Dictionary) -> Document {
    let count = kids.len() as i64;
    let mut pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
    };
    for (key, value) in extra.iter() {
        pages.set(key.clone(), value.clone());
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("in-memory save should succeed");
    bytes
}

fn page_tree(pages: &[(f32, f32)], with_contents: bool) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids = pages
        .iter()
        .map(|&(width, height)| {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box(width, height),
            };
            if with_contents {
                let contents = Stream::new(dictionary! {}, b"BT /F1 12 Tf (hello) Tj ET".to_vec());
                page.set("Contents", doc.add_object(contents));
            }
            Object::Reference(doc.add_object(page))
        })
        .collect();

    build(doc, pages_id, kids, lopdf::Dictionary::new())
}

/// One page per entry, each with its own `/MediaBox` in points.
pub fn sample_pdf(pages: &[(f32, f32)]) -> Vec<u8> {
    save(page_tree(pages, false))
}

/// A single page whose box and rotation live on the page tree node.
pub fn sample_pdf_with_inherited_box(width: f32, height: f32, rotate: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
    });

    let inherited = dictionary! {
        "MediaBox" => media_box(width, height),
        "Rotate" => rotate,
    };

    save(build(doc, pages_id, vec![Object::Reference(page_id)], inherited))
}

fn encrypted_document(pages: &[(f32, f32)], cipher: Cipher, user: &str, owner: &str) -> Document {
    let mut doc = page_tree(pages, true);
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::string_literal(vec![1u8; 16]),
            Object::string_literal(vec![2u8; 16]),
        ]),
    );

    let permissions = Permissions::all();
    let version = match cipher {
        Cipher::Rc4V1 => EncryptionVersion::V1 {
            document: &doc,
            owner_password: owner,
            user_password: user,
            permissions,
        },
        Cipher::Rc4V2 => EncryptionVersion::V2 {
            document: &doc,
            owner_password: owner,
            user_password: user,
            key_length: 128,
            permissions,
        },
        Cipher::Aes128 => {
            let filter: Arc<dyn CryptFilter> = Arc::new(Aes128CryptFilter);
            EncryptionVersion::V4 {
                document: &doc,
                encrypt_metadata: true,
                crypt_filters: BTreeMap::from([(STD_CF.to_vec(), filter)]),
                stream_filter: STD_CF.to_vec(),
                string_filter: STD_CF.to_vec(),
                owner_password: owner,
                user_password: user,
                permissions,
            }
        }
        Cipher::Aes256 => {
            let filter: Arc<dyn CryptFilter> = Arc::new(Aes256CryptFilter);
            EncryptionVersion::V5 {
                encrypt_metadata: true,
                crypt_filters: BTreeMap::from([(STD_CF.to_vec(), filter)]),
                file_encryption_key: &FILE_KEY,
                stream_filter: STD_CF.to_vec(),
                string_filter: STD_CF.to_vec(),
                owner_password: owner,
                user_password: user,
                permissions,
            }
        }
    };

    let state = EncryptionState::try_from(version).expect("encryption parameters should be valid");
    doc.encrypt(&state).expect("document should encrypt");
    doc
}

/// Standard security handler document. An empty `user` password opens
/// without prompting; `owner` unlocks it as well.
pub fn encrypted_pdf(pages: &[(f32, f32)], cipher: Cipher, user: &str, owner: &str) -> Vec<u8> {
    save(encrypted_document(pages, cipher, user, owner))
}

/// Encrypted with a handler version no reader implements.
pub fn unsupported_encryption_pdf(pages: &[(f32, f32)], user: &str) -> Vec<u8> {
    let mut doc = encrypted_document(pages, Cipher::Rc4V2, user, "owner");
    let encrypt_id = doc
        .trailer
        .get(b"Encrypt")
        .and_then(Object::as_reference)
        .expect("encrypted document should reference its /Encrypt dictionary");
    doc.get_dictionary_mut(encrypt_id).expect("/Encrypt should be a dictionary").set("V", 7);
    save(doc)
}
