#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDecl {
    pub is_static: bool,
    pub signature: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassDecl {
    pub name: &'static str,
    /// Foreign classes are backed by a native value type; only they may
    /// declare instance methods.
    pub foreign: bool,
    pub methods: &'static [MethodDecl],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeModuleDecl {
    pub path: &'static str,
    pub classes: &'static [ClassDecl],
}

const fn static_fn(signature: &'static str) -> MethodDecl {
    MethodDecl {
        is_static: true,
        signature,
    }
}

const fn method(signature: &'static str) -> MethodDecl {
    MethodDecl {
        is_static: false,
        signature,
    }
}

pub const BASE_NATIVE: &str = "base/native";
pub const LUA_INTERFACE_NATIVE: &str = "base/native/LuaInterface_001";
pub const XML_NATIVE: &str = "base/native/XML_001";
pub const DB_NATIVE: &str = "base/native/DB_001";

pub const NATIVE_MODULES: &[NativeModuleDecl] = &[
    NativeModuleDecl {
        path: BASE_NATIVE,
        classes: &[
            ClassDecl {
                name: "Logger",
                foreign: false,
                methods: &[static_fn("log(_)")],
            },
            ClassDecl {
                name: "IO",
                foreign: false,
                methods: &[
                    static_fn("listDirectory(_,_)"),
                    static_fn("info(_)"),
                    static_fn("read(_)"),
                    static_fn("idstring_hash(_)"),
                    static_fn("load_plugin(_)"),
                ],
            },
        ],
    },
    NativeModuleDecl {
        path: LUA_INTERFACE_NATIVE,
        classes: &[ClassDecl {
            name: "LuaInterface",
            foreign: false,
            methods: &[static_fn("register_object(_,_)")],
        }],
    },
    NativeModuleDecl {
        path: XML_NATIVE,
        classes: &[
            ClassDecl {
                name: "XML",
                foreign: true,
                methods: &[
                    static_fn("parse(_)"),
                    static_fn("new_document(_)"),
                    method("root()"),
                    method("to_string()"),
                    method("merge_into(_)"),
                    method("clone_node(_)"),
                ],
            },
            ClassDecl {
                name: "XMLNode",
                foreign: true,
                methods: &[
                    method("name()"),
                    method("set_name(_)"),
                    method("attribute(_)"),
                    method("set_attribute(_,_)"),
                    method("remove_attribute(_)"),
                    method("attribute_names()"),
                    method("text()"),
                    method("set_text(_)"),
                    method("parent()"),
                    method("children()"),
                    method("first_child()"),
                    method("next_sibling()"),
                    method("find_children(_)"),
                    method("create_element(_)"),
                    method("append_copy(_)"),
                    method("remove()"),
                    method("move_to_new_document()"),
                    method("clone_to_document()"),
                    method("is_valid()"),
                    method("usages()"),
                    method("to_string()"),
                ],
            },
        ],
    },
    NativeModuleDecl {
        path: DB_NATIVE,
        classes: &[
            ClassDecl {
                name: "DBManager",
                foreign: false,
                methods: &[static_fn("register_asset_hook(_,_)")],
            },
            ClassDecl {
                name: "AssetHook",
                foreign: true,
                methods: &[
                    method("set_plain_file(_)"),
                    method("set_content(_)"),
                    method("clear()"),
                    method("enabled()"),
                ],
            },
        ],
    },
];

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::signature::CallSignature;

    #[test]
    fn every_declared_signature_parses() {
        for module in NATIVE_MODULES {
            for class in module.classes {
                for method in class.methods {
                    assert!(
                        CallSignature::parse(method.signature).is_some(),
                        "{}::{} {}",
                        module.path,
                        class.name,
                        method.signature
                    );
                }
            }
        }
    }

    #[test]
    fn only_foreign_classes_declare_instance_methods() {
        for module in NATIVE_MODULES {
            for class in module.classes {
                if !class.foreign {
                    assert!(class.methods.iter().all(|method| method.is_static), "{}", class.name);
                }
            }
        }
    }

    #[test]
    fn module_paths_are_unique() {
        let paths = NATIVE_MODULES
            .iter()
            .map(|module| module.path)
            .collect::<BTreeSet<_>>();
        assert_eq!(paths.len(), NATIVE_MODULES.len());
    }
}
