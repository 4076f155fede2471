//! `#[derive(Schema)]`: turns a struct of `Table<T>` fields into a closed store schema.
//!
//! Each field becomes one table.  The field's declaration position is its table index, which is also its bit in query
//! keys, so the mapping from row type to table is fixed when the struct is compiled.  Everything that would make that
//! mapping ambiguous is a compile error here rather than a runtime failure in the store.
use darling::{ast::Data, util::Ignored, util::SpannedValue, FromDeriveInput};
use proc_macro::{self, TokenStream};
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Must agree with `tabula::MAX_TABLES`.
const MAX_TABLES: usize = 64;

#[derive(darling::FromDeriveInput)]
#[darling(supports(struct_named))]
struct MacroInput {
    ident: syn::Ident,
    generics: SpannedValue<syn::Generics>,
    data: Data<Ignored, TableField>,
}

#[derive(darling::FromField)]
#[darling(attributes(table))]
struct TableField {
    ident: Option<syn::Ident>,
    ty: syn::Type,

    /// Display name of the table, used in logs.  Defaults to the field name.
    #[darling(default)]
    name: Option<SpannedValue<String>>,
}

/// Pull `T` out of `Table<T>`, whatever path the user spelled `Table` with.
fn row_type(ty: &syn::Type) -> Option<&syn::Type> {
    let path = match ty {
        syn::Type::Path(p) if p.qself.is_none() => &p.path,
        _ => return None,
    };
    let segment = path.segments.last()?;
    if segment.ident != "Table" {
        return None;
    }

    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) if args.args.len() == 1 => match args.args.first()? {
            syn::GenericArgument::Type(t) => Some(t),
            _ => None,
        },
        _ => None,
    }
}

#[proc_macro_derive(Schema, attributes(table))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let derive_input: DeriveInput = parse_macro_input!(input);
    let input = match MacroInput::from_derive_input(&derive_input) {
        Err(e) => return e.write_errors().into(),
        Ok(x) => x,
    };

    let MacroInput {
        ident,
        generics,
        data,
    } = input;

    let mut errors: Vec<darling::Error> = Default::default();
    if !generics.params.is_empty() {
        let e = darling::Error::custom("Schema structs may not be generic").with_span(&generics);
        errors.push(e);
    }

    let fields = data
        .take_struct()
        .expect("darling only accepts named structs here")
        .fields;

    if fields.is_empty() {
        errors.push(darling::Error::custom("A schema must declare at least one table").with_span(&ident));
    }
    if fields.len() > MAX_TABLES {
        let e = darling::Error::custom(format!(
            "A schema may declare at most {} tables, found {}",
            MAX_TABLES,
            fields.len()
        ))
        .with_span(&ident);
        errors.push(e);
    }

    let mut field_idents = vec![];
    let mut row_types = vec![];
    let mut names = vec![];
    let mut seen: Vec<String> = vec![];

    for field in fields.iter() {
        let field_ident = field
            .ident
            .clone()
            .expect("Named structs always have field idents");

        let row = match row_type(&field.ty) {
            Some(r) => r,
            None => {
                let e = darling::Error::custom("Schema fields must have the type `Table<RowType>`")
                    .with_span(&field.ty);
                errors.push(e);
                continue;
            }
        };

        let row_str = quote!(#row).to_string();
        if seen.contains(&row_str) {
            let e = darling::Error::custom(format!(
                "Row type `{}` is already stored by another table of this schema",
                row_str
            ))
            .with_span(&field.ty);
            errors.push(e);
            continue;
        }
        seen.push(row_str);

        let name = match &field.name {
            Some(n) if n.is_empty() => {
                errors.push(darling::Error::custom("Table names may not be empty").with_span(n));
                continue;
            }
            Some(n) => (**n).clone(),
            None => field_ident.to_string(),
        };

        field_idents.push(field_ident);
        row_types.push(row.clone());
        names.push(name);
    }

    if !errors.is_empty() {
        return darling::Error::multiple(errors).write_errors().into();
    }

    let count = field_idents.len();
    let indices = (0..count).map(syn::Index::from).collect::<Vec<_>>();

    let out = quote! {
        impl ::tabula::Schema for #ident {
            const TABLE_COUNT: usize = #count;
            const TABLE_NAMES: &'static [&'static str] = &[#(#names),*];

            fn with_table_capacity(capacity: usize) -> Self {
                #ident {
                    #(#field_idents: ::tabula::Table::with_capacity(capacity),)*
                }
            }

            fn contains_row(&self, table: ::tabula::TableIndex, id: ::tabula::Id) -> bool {
                match table.get() {
                    #(#indices => self.#field_idents.contains(id),)*
                    _ => false,
                }
            }

            fn remove_row(&mut self, table: ::tabula::TableIndex, id: ::tabula::Id) -> bool {
                match table.get() {
                    #(#indices => self.#field_idents.remove(id).is_some(),)*
                    _ => false,
                }
            }

            fn table_len(&self, table: ::tabula::TableIndex) -> usize {
                match table.get() {
                    #(#indices => self.#field_idents.len(),)*
                    _ => 0,
                }
            }
        }

        #(
            impl ::tabula::HasTable<#row_types> for #ident {
                const INDEX: ::tabula::TableIndex = ::tabula::TableIndex::new(#indices);

                fn table(&self) -> &::tabula::Table<#row_types> {
                    &self.#field_idents
                }

                fn table_mut(&mut self) -> &mut ::tabula::Table<#row_types> {
                    &mut self.#field_idents
                }
            }
        )*
    };

    out.into()
}
