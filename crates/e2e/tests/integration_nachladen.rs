//! Integrationstests: Schluessel aus der Registry nachladen

mod common;

use std::sync::Arc;

use chatvault_core::GroupId;
use chatvault_e2e::{DecryptedText, E2eError};
use chatvault_registry::{MemoryRegistry, RegistryError};
use common::Umgebung;

#[tokio::test]
async fn neues_mitglied_sendet_ohne_manuelles_laden() {
    let env = Umgebung::new();
    let u1 = env.benutzer("u1").await;
    let u2 = env.benutzer("u2").await;
    let g = GroupId::from("g");
    u1.keys().create_group_with_encryption(&g).await.unwrap();
    u1.keys().add_user_to_group_encryption(&g, u2.user_id()).await.unwrap();
    assert!(u2.keys().is_group_member(&g).await.unwrap());
    assert_eq!(u2.keys().local_version(&g).await.unwrap(), None);

    let c = u2.cipher().encrypt_for_group("hallo von u2", &g).await.unwrap();
    assert!(c.starts_with("cv1:"));
    assert_eq!(u2.keys().local_version(&g).await.unwrap(), Some(1));
    assert_eq!(
        u1.cipher().decrypt_for_group(&c, &g).await.unwrap(),
        DecryptedText::Decrypted("hallo von u2".into())
    );
}

#[tokio::test]
async fn neues_mitglied_empfaengt_ohne_manuelles_laden() {
    let env = Umgebung::new();
    let u1 = env.benutzer("u1").await;
    let u2 = env.benutzer("u2").await;
    let g = GroupId::from("g");
    u1.keys().create_group_with_encryption(&g).await.unwrap();
    let c = u1.cipher().encrypt_for_group("willkommen", &g).await.unwrap();

    u1.keys().add_user_to_group_encryption(&g, u2.user_id()).await.unwrap();
    assert_eq!(
        u2.cipher().decrypt_for_group(&c, &g).await.unwrap(),
        DecryptedText::Decrypted("willkommen".into())
    );
}

#[tokio::test]
async fn neuere_version_wird_beim_empfang_geladen() {
    let env = Umgebung::new();
    let u1 = env.benutzer("u1").await;
    let u2 = env.benutzer("u2").await;
    let u3 = env.benutzer("u3").await;
    let g = GroupId::from("g");
    u1.keys().create_group_with_encryption(&g).await.unwrap();
    u1.keys().add_user_to_group_encryption(&g, u2.user_id()).await.unwrap();
    u1.keys().add_user_to_group_encryption(&g, u3.user_id()).await.unwrap();
    u2.keys().load_group_key(&g).await.unwrap();
    u3.keys().load_group_key(&g).await.unwrap();

    u1.keys().remove_user_and_rotate_key(&g, u3.user_id()).await.unwrap();
    let c = u1.cipher().encrypt_for_group("ohne u3", &g).await.unwrap();

    assert!(u2.cipher().decrypt_for_group(&c, &g).await.unwrap().is_decrypted());
    assert_eq!(u2.keys().local_version(&g).await.unwrap(), Some(2));
    assert!(u3.cipher().decrypt_for_group(&c, &g).await.unwrap().is_undecryptable());
    assert_eq!(u3.keys().local_version(&g).await.unwrap(), Some(1));
}

#[tokio::test]
async fn fremde_bleiben_ohne_schluessel() {
    let env = Umgebung::new();
    let u1 = env.benutzer("u1").await;
    let fremd = env.benutzer("fremd").await;
    let g = GroupId::from("g");
    u1.keys().create_group_with_encryption(&g).await.unwrap();
    let c = u1.cipher().encrypt_for_group("intern", &g).await.unwrap();

    assert!(matches!(
        fremd.cipher().encrypt_for_group("x", &g).await,
        Err(E2eError::KeinSchluessel { .. })
    ));
    assert!(fremd.cipher().decrypt_for_group(&c, &g).await.unwrap().is_undecryptable());
    assert_eq!(fremd.keys().local_version(&g).await.unwrap(), None);
}

#[tokio::test]
async fn nachladen_bei_offline_registry() {
    let memory = MemoryRegistry::new();
    let env = Umgebung::mit_registry(Arc::new(memory.clone()));
    let u1 = env.benutzer("u1").await;
    let u2 = env.benutzer("u2").await;
    let g = GroupId::from("g");
    u1.keys().create_group_with_encryption(&g).await.unwrap();
    let c = u1.cipher().encrypt_for_group("spaeter", &g).await.unwrap();
    u1.keys().add_user_to_group_encryption(&g, u2.user_id()).await.unwrap();

    memory.set_erreichbar(false);
    assert!(matches!(
        u2.cipher().encrypt_for_group("x", &g).await,
        Err(E2eError::Registry(RegistryError::NichtErreichbar(_)))
    ));
    assert!(u2.cipher().decrypt_for_group(&c, &g).await.unwrap().is_undecryptable());

    memory.set_erreichbar(true);
    assert!(u2.cipher().decrypt_for_group(&c, &g).await.unwrap().is_decrypted());
}
