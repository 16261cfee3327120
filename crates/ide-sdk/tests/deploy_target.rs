#![cfg(unix)]

mod common;

use common::{RecordingEnv, Tree};
use ide_sdk::deploy::{DeployRequest, DeployRoutine, STRIPPED_DIR, SshTarDeploy};
use ide_sdk::target::TargetOptions;

fn request(tree: &Tree, strip: bool) -> DeployRequest {
    DeployRequest {
        image_dir: tree.image_dir(),
        workdir: tree.workdir(),
        fakeroot_cmd: Some(tree.pseudo().display().to_string()),
        fakeroot_env: format!(
            "PSEUDO_PREFIX={root}/pseudo PSEUDO_LOCALSTATEDIR={root}/pseudo-state/ PSEUDO_DISABLED=0",
            root = tree.root.display()
        ),
        strip_cmd: Some("aarch64-poky-linux-strip".into()),
        libdir: "/usr/lib".into(),
        base_libdir: "/lib".into(),
        strip,
        target: TargetOptions {
            target: "root@192.168.7.2".into(),
            port: Some("2222".into()),
            ..Default::default()
        },
    }
}

fn pseudo_prefix(tree: &Tree) -> String {
    format!(
        "env PSEUDO_PREFIX={root}/pseudo PSEUDO_LOCALSTATEDIR={root}/pseudo-state/ PSEUDO_DISABLED=0 {pseudo} /bin/sh -c ",
        root = tree.root.display(),
        pseudo = tree.pseudo().display()
    )
}

#[test]
fn unstripped_deploy_tars_image_under_pseudo() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let tree = Tree::new(tmp.path());
    tree.populate(&["/usr/bin/demo"]);
    let env = RecordingEnv::default();

    SshTarDeploy::new(&env)
        .deploy(&request(&tree, false))
        .expect("deploy");

    let commands = env.commands.borrow();
    assert_eq!(commands.len(), 1, "{commands:?}");
    let push = &commands[0];
    assert!(push.starts_with(&pseudo_prefix(&tree)), "{push}");
    assert!(
        push.contains(&format!("tar cf - -C {} . | ssh -p 2222", tree.image_dir().display())),
        "{push}"
    );
    assert!(!push.contains("--owner=0"), "{push}");
}

#[test]
fn stripped_deploy_copies_strips_and_tars_under_pseudo() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let tree = Tree::new(tmp.path());
    tree.populate(&["/usr/bin/demo", "/usr/sbin/demod"]);
    let env = RecordingEnv::default();

    SshTarDeploy::new(&env)
        .deploy(&request(&tree, true))
        .expect("deploy");

    let scratch = tree.workdir().join(STRIPPED_DIR);
    let commands = env.commands.borrow();
    assert_eq!(commands.len(), 4, "{commands:?}");
    for c in commands.iter() {
        assert!(c.starts_with(&pseudo_prefix(&tree)), "{c}");
    }
    assert!(commands[0].contains(&format!(
        "rm -rf {s} && cp -af {}/. {s}",
        tree.image_dir().display(),
        s = scratch.display()
    )));
    assert!(commands[1].contains(&format!(
        "aarch64-poky-linux-strip --remove-section=.comment --remove-section=.note {s}/usr/bin/demo {s}/usr/sbin/demod",
        s = scratch.display()
    )));
    assert!(commands[2].contains(&format!(
        "--strip-unneeded {}/usr/lib/libdemo.so.1",
        scratch.display()
    )));
    assert!(commands[3].contains(&format!("tar cf - -C {} . |", scratch.display())));
    assert!(!commands[3].contains("--owner=0"));
}

#[test]
fn without_pseudo_ownership_is_forced_to_root() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let tree = Tree::new(tmp.path());
    tree.populate(&["/usr/bin/demo"]);
    let env = RecordingEnv::default();
    let req = DeployRequest {
        fakeroot_cmd: None,
        ..request(&tree, false)
    };

    SshTarDeploy::new(&env).deploy(&req).expect("deploy");

    let commands = env.commands.borrow();
    assert!(commands[0].starts_with(&format!(
        "tar cf - -C {} --owner=0 --group=0 . | ",
        tree.image_dir().display()
    )));
}
