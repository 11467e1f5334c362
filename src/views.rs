//! Server-rendered pages.

use html_escape::{encode_double_quoted_attribute as attr, encode_text};
use itertools::Itertools as _;

use crate::db::{user, User};

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body>\n{body}\n</body>\n\
         </html>\n",
        title = encode_text(title),
    )
}

pub fn login(error: Option<&str>) -> String {
    let error = error
        .map(|e| format!("<p class=\"error\">{}</p>\n", encode_text(e)))
        .unwrap_or_default();
    page(
        "Login",
        &format!(
            "<h1>Login</h1>\n\
             {error}\
             <form method=\"post\" action=\"/login\">\n\
             <label>Username <input name=\"username\" required></label>\n\
             <label>Password <input name=\"password\" type=\"password\" \
             required></label>\n\
             <button type=\"submit\">Login</button>\n\
             </form>"
        ),
    )
}

pub fn customer_dashboard(user: &User) -> String {
    page(
        "Dashboard",
        &format!(
            "<h1>Welcome, {username}</h1>\n\
             <dl>\n\
             <dt>ID</dt><dd>{id}</dd>\n\
             <dt>Username</dt><dd>{username}</dd>\n\
             <dt>Role</dt><dd>{role}</dd>\n\
             </dl>\n\
             <a href=\"/logout\">Logout</a>",
            id = user.id,
            username = encode_text(&user.username),
            role = encode_text(user.role.as_str()),
        ),
    )
}

fn user_row(user: &User) -> String {
    format!(
        "<tr data-id=\"{id}\" data-username=\"{username_attr}\" \
         data-role=\"{role_attr}\">\
         <td>{id}</td><td>{username}</td><td>{role}</td>\
         <td><a href=\"/admin/edit_user/{id}\">Edit</a> \
         <a href=\"/admin/delete_user/{id}\">Delete</a></td>\
         </tr>",
        id = user.id,
        username_attr = attr(&user.username),
        role_attr = attr(user.role.as_str()),
        username = encode_text(&user.username),
        role = encode_text(user.role.as_str()),
    )
}

pub fn admin_dashboard(users: &[User]) -> String {
    let rows = users.iter().map(user_row).join("\n");
    page(
        "Admin Dashboard",
        &format!(
            "<h1>Users</h1>\n\
             <a href=\"/admin/add_user\">Add user</a> \
             <a href=\"/logout\">Logout</a>\n\
             <table>\n\
             <thead><tr><th>ID</th><th>Username</th><th>Role</th>\
             <th></th></tr></thead>\n\
             <tbody>\n{rows}\n</tbody>\n\
             </table>"
        ),
    )
}

fn role_options(selected: Option<&user::Role>) -> String {
    let mut roles = vec![user::Role::Admin, user::Role::Customer];
    if let Some(other @ user::Role::Other(_)) = selected {
        roles.push(other.clone());
    }
    roles
        .iter()
        .map(|role| {
            let selected = if Some(role) == selected {
                " selected"
            } else {
                ""
            };
            format!(
                "<option value=\"{value}\"{selected}>{text}</option>",
                value = attr(role.as_str()),
                text = encode_text(role.as_str()),
            )
        })
        .join("")
}

pub fn add_user() -> String {
    page(
        "Add User",
        &format!(
            "<h1>Add user</h1>\n\
             <form method=\"post\" action=\"/admin/add_user\">\n\
             <label>Username <input name=\"username\" required></label>\n\
             <label>Password <input name=\"password\" type=\"password\" \
             required></label>\n\
             <label>Role <select name=\"role\">{roles}</select></label>\n\
             <button type=\"submit\">Add</button>\n\
             </form>\n\
             <a href=\"/admin/dashboard\">Back</a>",
            roles = role_options(None),
        ),
    )
}

pub fn edit_user(user: &User) -> String {
    page(
        "Edit User",
        &format!(
            "<h1>Edit user {id}</h1>\n\
             <form method=\"post\" action=\"/admin/edit_user/{id}\">\n\
             <label>Username <input name=\"username\" value=\"{username}\" \
             required></label>\n\
             <label>Password <input name=\"password\" type=\"password\" \
             required></label>\n\
             <label>Role <select name=\"role\">{roles}</select></label>\n\
             <button type=\"submit\">Save</button>\n\
             </form>\n\
             <a href=\"/admin/dashboard\">Back</a>",
            id = user.id,
            username = attr(&user.username),
            roles = role_options(Some(&user.role)),
        ),
    )
}
